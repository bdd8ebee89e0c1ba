pub mod error;
pub mod ledger;
pub mod settlement;
pub mod transactions;
pub mod withdrawals;

pub use error::{SettlementError, SettlementResult};
pub use ledger::{AvailableBalance, BalanceLedger};
pub use settlement::{BalanceSummary, SettlementComponents, SettlementService};
pub use transactions::{InitiatePayment, PaymentInitiation, TransactionManager};
pub use withdrawals::{WithdrawalManager, WithdrawalReceipt};
