use crate::error::{AppError, AppResult};
use crate::middleware::{AuthenticatedUser, Gate};
use crate::service::{RegisterRequest, UserService};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

type Service = web::Data<UserService>;

#[derive(Deserialize)]
struct LoginParams {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieParams {
    movie_id: u64,
}

#[derive(Deserialize)]
struct RatingParams {
    rating: f32,
}

/// Mounts `/user`. Register and login are public, everything else sits
/// behind the bearer gate.
pub fn configure(cfg: &mut web::ServiceConfig, service: Service) {
    let tokens = service.tokens();
    cfg.app_data(service)
        .app_data(web::JsonConfig::default().error_handler(|err, _| {
            AppError::BadRequest(err.to_string()).into()
        }))
        .app_data(web::PathConfig::default().error_handler(|err, _| {
            AppError::BadRequest(err.to_string()).into()
        }))
        .service(web::resource("/user/register").route(web::post().to(register)))
        .service(web::resource("/user/login").route(web::post().to(login)))
        .service(
            web::scope("/user")
                .wrap(Gate::bearer(tokens))
                .route("/self", web::get().to(get_self))
                .route("/add-movie", web::post().to(add_movie))
                .route("/delete-movie", web::delete().to(delete_movie))
                .route("/add-rating/{movie_id}", web::patch().to(add_rating))
                .route("/movies", web::get().to(get_all_movies))
                .route("/movie/{movie_id}", web::get().to(get_single_movie)),
        );
}

async fn register(service: Service, body: web::Json<RegisterRequest>) -> AppResult<HttpResponse> {
    let user = service.register(body.into_inner())?;
    Ok(HttpResponse::Created().json(user))
}

async fn login(service: Service, body: web::Json<LoginParams>) -> AppResult<HttpResponse> {
    let response = service.login(&body.email, &body.password)?;
    Ok(HttpResponse::Ok().json(response))
}

async fn get_self(service: Service, user: AuthenticatedUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.get_self(user.id)?))
}

async fn add_movie(
    service: Service,
    user: AuthenticatedUser,
    body: web::Json<MovieParams>,
) -> AppResult<HttpResponse> {
    let updated = service.add_movie(user.id, body.movie_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

async fn delete_movie(
    service: Service,
    user: AuthenticatedUser,
    body: web::Json<MovieParams>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.delete_movie(user.id, body.movie_id)?))
}

async fn add_rating(
    service: Service,
    user: AuthenticatedUser,
    movie_id: web::Path<u64>,
    body: web::Json<RatingParams>,
) -> AppResult<HttpResponse> {
    let movie = service.add_rating(user.id, movie_id.into_inner(), body.rating)?;
    Ok(HttpResponse::Ok().json(movie))
}

async fn get_all_movies(service: Service, user: AuthenticatedUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.get_all_movies(user.id)?))
}

async fn get_single_movie(
    service: Service,
    user: AuthenticatedUser,
    movie_id: web::Path<u64>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.get_single_movie(user.id, movie_id.into_inner())?))
}
