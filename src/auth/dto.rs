use serde::Deserialize;

/// Registration form body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub password: String,
    pub confirm_password: String,
}

/// Login form body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub name: String,
    pub password: String,
}
