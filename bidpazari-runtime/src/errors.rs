use thiserror::Error;

/// Reasons a bid can be refused before any funds are touched. Messages are
/// the user-visible, recoverable strings a client renders verbatim.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BiddingErrorReason {
    #[error("You must bid a higher amount!")]
    InsufficientAmount,
    #[error("The auction is closed!")]
    AuctionClosed,
    #[error("This is your own auction -- you cannot bid in it!")]
    OwnAuction,
}

#[derive(Debug, Error)]
#[error("Bidding not allowed: {reason}")]
pub struct BiddingNotAllowed {
    pub reason: BiddingErrorReason,
}

impl BiddingNotAllowed {
    pub fn new(reason: BiddingErrorReason) -> Self {
        Self { reason }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct InsufficientBalance(pub String);

#[derive(Debug, Error)]
#[error("Auction with ID {0} does not exist.")]
pub struct AuctionDoesNotExist(pub String);

#[derive(Debug, Error)]
#[error("This item is already on sale.")]
pub struct ItemAlreadyOnSale;

#[derive(Debug, Error)]
#[error("Invalid auction status: {0}")]
pub struct InvalidAuctionStatus(pub String);

#[derive(Debug, Error)]
#[error("{0} must be called on a persisted user")]
pub struct NonPersistentObjectError(pub String);

#[derive(Debug, Error)]
#[error("Invalid password.")]
pub struct InvalidPassword;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserVerificationError(pub String);

/// Top-level user-visible, recoverable error taxonomy. Returned to clients
/// with wire code 1. Every variant corresponds to one of the subkinds named
/// in the command surface.
#[derive(Debug, Error)]
pub enum CommandFailed {
    #[error(transparent)]
    BiddingNotAllowed(#[from] BiddingNotAllowed),

    #[error(transparent)]
    InsufficientBalance(#[from] InsufficientBalance),

    #[error(transparent)]
    InvalidPassword(#[from] InvalidPassword),

    #[error(transparent)]
    UserVerificationError(#[from] UserVerificationError),

    #[error(transparent)]
    InvalidAuctionStatus(#[from] InvalidAuctionStatus),

    #[error(transparent)]
    AuctionDoesNotExist(#[from] AuctionDoesNotExist),

    #[error(transparent)]
    ItemAlreadyOnSale(#[from] ItemAlreadyOnSale),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Catch-all for the plain user-facing strings the dispatcher raises
    /// directly (login gate, auth failures, and the like).
    #[error("{0}")]
    Message(String),
}

impl CommandFailed {
    pub fn message(msg: impl Into<String>) -> Self {
        CommandFailed::Message(msg.into())
    }
}

impl From<StoreError> for CommandFailed {
    fn from(err: StoreError) -> Self {
        CommandFailed::Message(err.to_string())
    }
}

/// Errors raised by the `Store` collaborator. Kept separate from
/// `CommandFailed` because not every store failure is user-facing --
/// callers decide how to surface it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No such user: {0}")]
    UserNotFound(String),

    #[error("No such item: {0}")]
    ItemNotFound(String),

    #[error("No such ownership: {0}")]
    OwnershipNotFound(String),

    #[error("Ownership invariant violated: {0}")]
    InvariantViolation(String),
}
