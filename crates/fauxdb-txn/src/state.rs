/// Per-session state machine. `Committed`/`Aborted` are terminal but
/// retained (not removed) so a repeated `commitTransaction`/`abortTransaction`
/// for the same `txnNumber` can be answered as an idempotent replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
    Committed,
    Aborted,
}
