//! Request gate: an ordered list of interceptors run before the handler.

use crate::auth::TokenService;
use crate::error::AppError;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderValue, AUTHORIZATION},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::{ok, ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

/// What interceptors have learned about the request so far.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: Option<u64>,
}

pub trait Interceptor {
    fn intercept(
        &self,
        req: &ServiceRequest,
        ctx: RequestContext,
    ) -> Result<RequestContext, AppError>;
}

/// Identity attached to the request once the bearer token checks out.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: u64,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .copied()
                .ok_or_else(not_logged_in),
        )
    }
}

fn not_logged_in() -> AppError {
    AppError::Unauthenticated("you must be logged in to access this route".to_owned())
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, AppError> {
    let header = header.ok_or_else(not_logged_in)?;
    let missing_bearer = || AppError::BadRequest("please provide a Bearer token".to_owned());
    let value = header.to_str().map_err(|_| missing_bearer())?;
    let mut parts = value.splitn(2, ' ');
    if parts.next() != Some("Bearer") {
        return Err(missing_bearer());
    }
    match parts.next().map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(missing_bearer()),
    }
}

pub struct BearerAuth {
    tokens: Arc<TokenService>,
}

impl BearerAuth {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        BearerAuth { tokens }
    }
}

impl Interceptor for BearerAuth {
    fn intercept(
        &self,
        req: &ServiceRequest,
        mut ctx: RequestContext,
    ) -> Result<RequestContext, AppError> {
        let token = bearer_token(req.headers().get(AUTHORIZATION))?;
        let claims = self.tokens.verify(token)?;
        ctx.user_id = Some(claims.user_id()?);
        Ok(ctx)
    }
}

#[derive(Clone)]
pub struct Gate {
    interceptors: Rc<Vec<Box<dyn Interceptor>>>,
}

impl Gate {
    pub fn new(interceptors: Vec<Box<dyn Interceptor>>) -> Self {
        Gate {
            interceptors: Rc::new(interceptors),
        }
    }

    pub fn bearer(tokens: Arc<TokenService>) -> Self {
        Gate::new(vec![Box::new(BearerAuth::new(tokens))])
    }
}

impl<S, B> Transform<S, ServiceRequest> for Gate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = GateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(GateService {
            service: Rc::new(service),
            interceptors: Rc::clone(&self.interceptors),
        })
    }
}

pub struct GateService<S> {
    service: Rc<S>,
    interceptors: Rc<Vec<Box<dyn Interceptor>>>,
}

impl<S, B> Service<ServiceRequest> for GateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let ctx = self
            .interceptors
            .iter()
            .try_fold(RequestContext::default(), |ctx, interceptor| {
                interceptor.intercept(&req, ctx)
            });
        let ctx = match ctx {
            Ok(ctx) => ctx,
            Err(err) => return Box::pin(ready(Err(err.into()))),
        };
        if let Some(id) = ctx.user_id {
            req.extensions_mut().insert(AuthenticatedUser { id });
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move { service.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, web, App, HttpResponse};
    use chrono::Duration;

    fn header(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        assert!(matches!(
            bearer_token(None).unwrap_err(),
            AppError::Unauthenticated(_)
        ));
    }

    #[test]
    fn wrong_scheme_is_bad_request() {
        let value = header("Basic abc");
        assert!(matches!(
            bearer_token(Some(&value)).unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn empty_token_is_bad_request() {
        for raw in &["Bearer", "Bearer ", "Bearer    "] {
            let value = header(raw);
            assert!(matches!(
                bearer_token(Some(&value)).unwrap_err(),
                AppError::BadRequest(_)
            ));
        }
    }

    #[test]
    fn bearer_token_is_extracted() {
        let value = header("Bearer abc.def.ghi");
        assert_eq!(bearer_token(Some(&value)).unwrap(), "abc.def.ghi");
    }

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.id.to_string())
    }

    #[actix_rt::test]
    async fn gate_attaches_user_id() {
        let tokens = Arc::new(TokenService::new("secret", Duration::hours(1)));
        let token = tokens.issue(17).unwrap();
        let app = actix_test::init_service(
            App::new().service(
                web::scope("")
                    .wrap(Gate::bearer(tokens.clone()))
                    .route("/whoami", web::get().to(whoami)),
            ),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/whoami")
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body, web::Bytes::from_static(b"17"));
    }

    #[actix_rt::test]
    async fn gate_rejects_before_handler() {
        let tokens = Arc::new(TokenService::new("secret", Duration::hours(1)));
        let app = actix_test::init_service(
            App::new().service(
                web::scope("")
                    .wrap(Gate::bearer(tokens))
                    .route("/whoami", web::get().to(whoami)),
            ),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/whoami").to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code().as_u16(), 401);

        let req = actix_test::TestRequest::get()
            .uri("/whoami")
            .insert_header((AUTHORIZATION, "Bearer forged"))
            .to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code().as_u16(), 401);
    }

    #[test]
    fn handler_without_gate_sees_no_user() {
        let req = actix_test::TestRequest::default().to_http_request();
        let err = AuthenticatedUser::extract(&req).into_inner().unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }
}
