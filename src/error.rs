use thiserror::Error;

/// Failures talking to the hosted profile store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),
}

/// Failures of the pin shop. None of these leave a partial write behind.
#[derive(Error, Debug)]
pub enum ShopError {
    #[error("unknown pin style: {0}")]
    UnknownStyle(String),

    #[error("not enough RSM: balance {balance}, price {price}")]
    InsufficientFunds { balance: u64, price: u64 },

    #[error("balance changed while purchasing, nothing was charged")]
    Conflict,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures inside the device location bridge.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("malformed bridge frame: {0}")]
    Decode(#[from] simd_json::Error),

    #[error("failed to encode watch request: {0}")]
    Encode(#[from] serde_json::Error),
}
