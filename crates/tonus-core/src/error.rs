use std::fmt;

#[derive(Debug)]
pub enum TonusError {
    Telegram(String),
    Llm { provider: String, message: String },
    Database(String),
    Config(String),
    Http { status: u16, body: String },
    Timezone(String),
}

impl fmt::Display for TonusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telegram(msg) => write!(f, "telegram error: {msg}"),
            Self::Llm { provider, message } => write!(f, "llm error ({provider}): {message}"),
            Self::Database(msg) => write!(f, "database error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Http { status, body } => write!(f, "http error ({status}): {body}"),
            Self::Timezone(msg) => write!(f, "timezone error: {msg}"),
        }
    }
}

impl std::error::Error for TonusError {}

pub type Result<T> = std::result::Result<T, TonusError>;
