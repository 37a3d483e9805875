use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User document as stored. Encoded with bincode, so no serde attributes that
/// skip fields.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub movies: Vec<Movie>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn movie(&self, movie_id: u64) -> Option<&Movie> {
        self.movies.iter().find(|movie| movie.id == movie_id)
    }

    pub fn movie_mut(&mut self, movie_id: u64) -> Option<&mut Movie> {
        self.movies.iter_mut().find(|movie| movie.id == movie_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: u64,
    pub rating: Option<f32>,
    pub added_at: DateTime<Utc>,
}

impl Movie {
    pub fn from_metadata(metadata: MovieMetadata, added_at: DateTime<Utc>) -> Self {
        Movie {
            id: metadata.id,
            title: metadata.title,
            overview: metadata.overview,
            poster_path: metadata.poster_path,
            release_date: metadata.release_date,
            vote_average: metadata.vote_average,
            vote_count: metadata.vote_count,
            rating: None,
            added_at,
        }
    }
}

/// Movie attributes as returned by the metadata API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieMetadata {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
}

/// Outward representation of a user. Never carries the password hash.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: u64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub movies: Vec<Movie>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(id: u64, user: User) -> Self {
        UserResponse {
            id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            age: user.age,
            gender: user.gender,
            movies: user.movies,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
