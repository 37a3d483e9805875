use crate::auth::{PasswordHasher, TokenService};
use crate::database::UserDb;
use crate::error::{AppError, AppResult};
use crate::model::*;
use crate::tmdb::MovieSource;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 5, message = "password must be at least 5 characters"))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn user_not_found() -> AppError {
    AppError::NotFound("user not found".to_owned())
}

fn movie_not_found() -> AppError {
    AppError::NotFound("movie not found".to_owned())
}

/// Registration, login and movie-list operations. Built once at start-up from
/// its collaborators.
pub struct UserService {
    db: sled::Db,
    hasher: PasswordHasher,
    tokens: Arc<TokenService>,
    movies: Arc<dyn MovieSource>,
}

impl UserService {
    pub fn new(
        db: sled::Db,
        hasher: PasswordHasher,
        tokens: Arc<TokenService>,
        movies: Arc<dyn MovieSource>,
    ) -> Self {
        UserService {
            db,
            hasher,
            tokens,
            movies,
        }
    }

    pub fn tokens(&self) -> Arc<TokenService> {
        Arc::clone(&self.tokens)
    }

    pub fn register(&self, mut request: RegisterRequest) -> AppResult<UserResponse> {
        request.email = normalize_email(&request.email);
        request
            .validate()
            .map_err(|err| AppError::Validation(err.to_string()))?;
        if self.db.get_user_by_email(&request.email)?.is_some() {
            return Err(AppError::Conflict("user already exists".to_owned()));
        }

        let now = Utc::now();
        let user = User {
            email: request.email,
            password_hash: self.hasher.hash(&request.password)?,
            first_name: request.first_name,
            last_name: request.last_name,
            age: request.age,
            gender: request.gender,
            movies: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        // The index check inside add_user catches a registration racing ours.
        let id = self
            .db
            .add_user(&user)?
            .ok_or_else(|| AppError::Conflict("user already exists".to_owned()))?;
        info!("registered user {} ({})", id, user.email);
        Ok(UserResponse::new(id, user))
    }

    pub fn login(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        let (id, user) = self
            .db
            .get_user_by_email(&normalize_email(email))?
            .ok_or_else(user_not_found)?;
        if !self.hasher.verify(password, &user.password_hash)? {
            return Err(AppError::Unauthorized("invalid credentials".to_owned()));
        }
        let token = self.tokens.issue(id)?;
        debug!("user {} logged in", id);
        Ok(LoginResponse {
            user: UserResponse::new(id, user),
            token,
        })
    }

    fn load(&self, user_id: u64) -> AppResult<User> {
        self.db.get_user(user_id)?.ok_or_else(user_not_found)
    }

    /// Read-modify-write of one user document. `change` may run more than once
    /// if another request wrote the same user in between.
    fn modify<T, F>(&self, user_id: u64, mut change: F) -> AppResult<(User, T)>
    where
        F: FnMut(&mut User) -> AppResult<T>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut user = self.load(user_id)?;
            let out = change(&mut user)?;
            user.updated_at = Utc::now();
            if self.db.update_user(user_id, &user)? {
                user.version += 1;
                return Ok((user, out));
            }
            debug!(
                "concurrent write to user {} (attempt {}), retrying",
                user_id, attempt
            );
        }
        Err(AppError::Conflict(
            "user was modified concurrently, try again".to_owned(),
        ))
    }

    pub fn get_self(&self, user_id: u64) -> AppResult<UserResponse> {
        Ok(UserResponse::new(user_id, self.load(user_id)?))
    }

    pub async fn add_movie(&self, user_id: u64, movie_id: u64) -> AppResult<UserResponse> {
        let metadata = self.movies.fetch(movie_id).await?;
        let (user, ()) = self.modify(user_id, |user| {
            if user.movie(movie_id).is_some() {
                return Err(AppError::Conflict("movie already exists".to_owned()));
            }
            user.movies
                .push(Movie::from_metadata(metadata.clone(), Utc::now()));
            Ok(())
        })?;
        info!("user {} added movie {}", user_id, movie_id);
        Ok(UserResponse::new(user_id, user))
    }

    /// Removing a movie that is not in the list is not an error.
    pub fn delete_movie(&self, user_id: u64, movie_id: u64) -> AppResult<UserResponse> {
        let (user, removed) = self.modify(user_id, |user| {
            let before = user.movies.len();
            user.movies.retain(|movie| movie.id != movie_id);
            Ok(user.movies.len() != before)
        })?;
        if removed {
            info!("user {} removed movie {}", user_id, movie_id);
        }
        Ok(UserResponse::new(user_id, user))
    }

    pub fn add_rating(&self, user_id: u64, movie_id: u64, rating: f32) -> AppResult<Movie> {
        if !rating.is_finite() || !(0.0..=10.0).contains(&rating) {
            return Err(AppError::Validation(
                "rating must be between 0 and 10".to_owned(),
            ));
        }
        let (_, movie) = self.modify(user_id, |user| {
            let movie = user.movie_mut(movie_id).ok_or_else(movie_not_found)?;
            movie.rating = Some(rating);
            Ok(movie.clone())
        })?;
        info!("user {} rated movie {} with {}", user_id, movie_id, rating);
        Ok(movie)
    }

    pub fn get_all_movies(&self, user_id: u64) -> AppResult<Vec<Movie>> {
        Ok(self.load(user_id)?.movies)
    }

    pub fn get_single_movie(&self, user_id: u64, movie_id: u64) -> AppResult<Movie> {
        self.load(user_id)?
            .movie(movie_id)
            .cloned()
            .ok_or_else(movie_not_found)
    }
}
