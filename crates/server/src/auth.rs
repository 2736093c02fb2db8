// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication seam.
//!
//! The password-hashing token store is an external collaborator; the hub
//! only needs these four calls. The shipped implementation is a single
//! operator account with a static token, configured from the environment.

use serde_json::{json, Value};

/// An authenticated operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub email: String,
}

pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, email: &str, password: &str) -> Option<AuthUser>;
    fn issue_token(&self, email: &str) -> Option<String>;
    fn verify_token(&self, token: &str) -> Option<AuthUser>;

    fn user_payload(&self, user: &AuthUser) -> Value {
        json!({ "email": user.email })
    }
}

/// Single-operator auth backed by one static bearer token.
pub struct StaticTokenAuth {
    email: String,
    password: String,
    token: String,
}

impl StaticTokenAuth {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self { email: email.into(), password: password.into(), token: token.into() }
    }
}

impl AuthProvider for StaticTokenAuth {
    fn authenticate(&self, email: &str, password: &str) -> Option<AuthUser> {
        if email == self.email && password == self.password {
            Some(AuthUser { email: self.email.clone() })
        } else {
            None
        }
    }

    fn issue_token(&self, email: &str) -> Option<String> {
        if email == self.email {
            Some(self.token.clone())
        } else {
            None
        }
    }

    fn verify_token(&self, token: &str) -> Option<AuthUser> {
        if !token.is_empty() && token == self.token {
            Some(AuthUser { email: self.email.clone() })
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
