use std::fmt;

/// Errors the market data provider can surface.
#[derive(Debug)]
pub enum MarketError {
    /// Network or transport failure (includes timeouts).
    Transport(String),
    /// The upstream API answered with a non-success status.
    Upstream { status: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// Upstream answered but carried no usable data for the symbol.
    NoData { symbol: String },
    /// Unrecognized range string.
    InvalidRange(String),
    /// Unrecognized interval string.
    InvalidInterval(String),
}

impl MarketError {
    /// Validation errors are the caller's fault (HTTP 400 territory);
    /// everything else is an upstream availability problem.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MarketError::InvalidRange(_) | MarketError::InvalidInterval(_)
        )
    }
}

impl fmt::Display for MarketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketError::Transport(msg) => write!(f, "market transport error: {msg}"),
            MarketError::Upstream { status, message } => {
                write!(f, "upstream market error status={status}: {message}")
            }
            MarketError::Decode(msg) => write!(f, "market decode error: {msg}"),
            MarketError::NoData { symbol } => write!(f, "no market data for symbol {symbol}"),
            MarketError::InvalidRange(r) => {
                write!(f, "invalid range '{r}'. expected one of: 1d 5d 1mo 3mo 6mo 1y 2y 5y")
            }
            MarketError::InvalidInterval(i) => {
                write!(f, "invalid interval '{i}'. expected one of: 1m 5m 15m 30m 1h 1d")
            }
        }
    }
}

impl std::error::Error for MarketError {}

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            MarketError::Decode(e.to_string())
        } else {
            MarketError::Transport(e.to_string())
        }
    }
}
