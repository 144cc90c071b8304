/// Rule violations raised by the credit, code and favorite bookkeeping on the
/// models. Stores surface these unchanged so every backend enforces the same
/// rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("You don't have credits to make a search")]
    InsufficientCredits,
    #[error("Amount must be greater than zero")]
    NonPositiveGrant,
    #[error("Code not found or already redeemed")]
    CodeAlreadyRedeemed,
    #[error("User has already redeemed the maximum of {0} codes.")]
    CodeLimitReached(usize),
    #[error("Fact is already a favorite")]
    AlreadyFavorite,
    #[error("Fact is not in favorites")]
    NotFavorite,
    #[error("You do not have permission to delete this fact")]
    NotOwner,
}
