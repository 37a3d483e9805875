use crate::model::*;
use sled::transaction::{abort, ConflictableTransactionError, TransactionError, Transactional};
use std::convert::TryInto;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("corrupt index entry")]
    CorruptIndex,
}

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<u64, DbError> {
    let bytes: [u8; 8] = id.as_ref().try_into().map_err(|_| DbError::CorruptIndex)?;
    Ok(u64::from_le_bytes(bytes))
}

pub trait UserDb {
    type Error;
    /// Returns `None` when the email is already taken.
    fn add_user(&self, user: &User) -> Result<Option<u64>, Self::Error>;
    fn get_user(&self, id: u64) -> Result<Option<User>, Self::Error>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<(u64, User)>, Self::Error>;
    /// Writes `user` only if the stored document still has `user.version`.
    /// The stored copy gets `version + 1`. Returns `false` on a lost race.
    fn update_user(&self, id: u64, user: &User) -> Result<bool, Self::Error>;
}

const USERS: &[u8] = b"users";
const USERS_EMAIL: &[u8] = b"USERS_EMAIL";

impl UserDb for sled::Db {
    type Error = DbError;

    fn add_user(&self, user: &User) -> Result<Option<u64>, DbError> {
        let users = self.open_tree(USERS)?;
        let users_email = self.open_tree(USERS_EMAIL)?;
        let id = self.generate_id()?;
        let key = serialize_id(id);
        let encoded = bincode::serialize(user)?;
        if let Err(err) = (&users, &users_email).transaction(|(users, users_email)| {
            users.insert(&key[..], encoded.clone())?;
            if users_email
                .insert(user.email.as_bytes(), &key[..])?
                .is_some()
            {
                abort(())?;
            }
            Ok(())
        }) {
            match err {
                TransactionError::Storage(e) => return Err(e.into()),
                TransactionError::Abort(()) => return Ok(None),
            };
        }
        Ok(Some(id))
    }

    fn get_user(&self, id: u64) -> Result<Option<User>, DbError> {
        let users = self.open_tree(USERS)?;
        match users.get(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<(u64, User)>, DbError> {
        let users_email = self.open_tree(USERS_EMAIL)?;
        let users = self.open_tree(USERS)?;
        if let Some(id) = users_email.get(email)? {
            let data = users.get(&id)?.ok_or(DbError::CorruptIndex)?;
            Ok(Some((deserialize_id(id)?, bincode::deserialize(&data)?)))
        } else {
            Ok(None)
        }
    }

    fn update_user(&self, id: u64, user: &User) -> Result<bool, DbError> {
        let users = self.open_tree(USERS)?;
        let key = serialize_id(id);
        let expected = user.version;
        let mut next = user.clone();
        next.version = expected + 1;
        let encoded = bincode::serialize(&next)?;
        let result = users.transaction(|users| {
            let current: User = match users.get(&key[..])? {
                Some(data) => bincode::deserialize(&data)
                    .map_err(|e| ConflictableTransactionError::Abort(DbError::from(e)))?,
                None => return Ok(false),
            };
            if current.version != expected {
                return Ok(false);
            }
            users.insert(&key[..], encoded.clone())?;
            Ok(true)
        });
        match result {
            Ok(written) => Ok(written),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            email: email.to_owned(),
            password_hash: "hash".to_owned(),
            first_name: None,
            last_name: None,
            age: None,
            gender: None,
            movies: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn add_and_fetch_user() {
        let db = temp_db();
        let id = db.add_user(&user("a@b.com")).unwrap().unwrap();
        assert_eq!(db.get_user(id).unwrap().unwrap().email, "a@b.com");
        let (found_id, found) = db.get_user_by_email("a@b.com").unwrap().unwrap();
        assert_eq!(found_id, id);
        assert_eq!(found.password_hash, "hash");
    }

    #[test]
    fn duplicate_email_is_rejected_without_second_record() {
        let db = temp_db();
        let first = db.add_user(&user("a@b.com")).unwrap();
        assert!(first.is_some());
        assert!(db.add_user(&user("a@b.com")).unwrap().is_none());
        assert_eq!(db.open_tree(USERS).unwrap().len(), 1);
    }

    #[test]
    fn unknown_user_is_none() {
        let db = temp_db();
        assert!(db.get_user(42).unwrap().is_none());
        assert!(db.get_user_by_email("nobody@b.com").unwrap().is_none());
    }

    #[test]
    fn update_bumps_version() {
        let db = temp_db();
        let id = db.add_user(&user("a@b.com")).unwrap().unwrap();
        let mut stored = db.get_user(id).unwrap().unwrap();
        stored.gender = Some("f".to_owned());
        assert!(db.update_user(id, &stored).unwrap());
        let reread = db.get_user(id).unwrap().unwrap();
        assert_eq!(reread.version, 1);
        assert_eq!(reread.gender.as_deref(), Some("f"));
    }

    #[test]
    fn stale_update_loses() {
        let db = temp_db();
        let id = db.add_user(&user("a@b.com")).unwrap().unwrap();
        let first = db.get_user(id).unwrap().unwrap();
        let mut second = first.clone();
        assert!(db.update_user(id, &first).unwrap());
        second.age = Some(30);
        assert!(!db.update_user(id, &second).unwrap());
        assert_eq!(db.get_user(id).unwrap().unwrap().age, None);
    }

    #[test]
    fn update_of_missing_user_is_not_written() {
        let db = temp_db();
        assert!(!db.update_user(9, &user("a@b.com")).unwrap());
        assert!(db.get_user(9).unwrap().is_none());
    }
}
