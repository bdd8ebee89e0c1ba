#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use settlement_core::adapters::InMemorySettlementStore;
use settlement_core::domain::{PlaylistRef, SongRef, Submission};
use settlement_core::gateway::{
    CreatePayment, CreatePayout, CreatedPayment, CreatedPayout, ExecutedPayment, GatewayError,
    GatewayResult, PaymentGateway,
};
use settlement_core::services::{SettlementComponents, SettlementService};

pub const CURATOR_EMAIL: &str = "curator@example.com";

/// Failure the scripted provider should answer with.
#[derive(Debug, Clone)]
pub enum Failure {
    Transport(&'static str),
    Request {
        status: u16,
        code: &'static str,
        message: &'static str,
    },
}

impl Failure {
    fn to_error(&self) -> GatewayError {
        match self {
            Failure::Transport(msg) => GatewayError::Transport(msg.to_string()),
            Failure::Request {
                status,
                code,
                message,
            } => GatewayError::Request {
                status: *status,
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

/// In-process provider double that records every call.
pub struct ScriptedGateway {
    pub execute_state: Mutex<String>,
    pub create_failure: Mutex<Option<Failure>>,
    pub execute_failure: Mutex<Option<Failure>>,
    pub payout_failure: Mutex<Option<Failure>>,
    pub created_payments: Mutex<Vec<CreatePayment>>,
    pub payouts: Mutex<Vec<CreatePayout>>,
    pub execute_calls: AtomicUsize,
    counter: AtomicUsize,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            execute_state: Mutex::new("approved".to_string()),
            create_failure: Mutex::new(None),
            execute_failure: Mutex::new(None),
            payout_failure: Mutex::new(None),
            created_payments: Mutex::new(Vec::new()),
            payouts: Mutex::new(Vec::new()),
            execute_calls: AtomicUsize::new(0),
            counter: AtomicUsize::new(0),
        }
    }
}

impl ScriptedGateway {
    pub fn fail_payouts_with(&self, failure: Failure) {
        *self.payout_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_payments_with(&self, failure: Failure) {
        *self.create_failure.lock().unwrap() = Some(failure);
    }

    pub fn execute_returns(&self, state: &str) {
        *self.execute_state.lock().unwrap() = state.to_string();
    }

    pub fn create_payment_calls(&self) -> usize {
        self.created_payments.lock().unwrap().len()
    }

    pub fn payout_calls(&self) -> usize {
        self.payouts.lock().unwrap().len()
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn access_token(&self) -> GatewayResult<String> {
        Ok("scripted-token".to_string())
    }

    async fn create_payment(&self, request: &CreatePayment) -> GatewayResult<CreatedPayment> {
        if let Some(failure) = self.create_failure.lock().unwrap().clone() {
            return Err(failure.to_error());
        }
        self.created_payments.lock().unwrap().push(request.clone());
        let id = self.next_id("PAY");
        Ok(CreatedPayment {
            approval_url: format!("https://provider.test/checkout?token={}", id),
            raw: json!({ "id": id, "state": "created" }),
            id,
        })
    }

    async fn execute_payment(
        &self,
        payment_id: &str,
        _payer_id: &str,
    ) -> GatewayResult<ExecutedPayment> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.execute_failure.lock().unwrap().clone() {
            return Err(failure.to_error());
        }
        let state = self.execute_state.lock().unwrap().clone();
        Ok(ExecutedPayment {
            raw: json!({ "id": payment_id, "state": state }),
            state,
        })
    }

    async fn create_payout(&self, request: &CreatePayout) -> GatewayResult<CreatedPayout> {
        // Give concurrent withdrawals a chance to interleave
        tokio::task::yield_now().await;
        if let Some(failure) = self.payout_failure.lock().unwrap().clone() {
            return Err(failure.to_error());
        }
        self.payouts.lock().unwrap().push(request.clone());
        let batch_id = self.next_id("BATCH");
        Ok(CreatedPayout {
            raw: json!({ "batch_header": { "payout_batch_id": batch_id, "batch_status": "PENDING" } }),
            batch_id,
        })
    }
}

pub struct Fixture {
    pub store: Arc<InMemorySettlementStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub service: Arc<SettlementService>,
    pub artist_id: Uuid,
    pub curator_id: Uuid,
    pub submission_id: Uuid,
}

impl Fixture {
    /// An artist, a curator with a linked payout account, and one submission
    /// to the curator's playlist at `fee` (major units).
    pub fn new(fee: &str) -> Self {
        Self::build(fee, true, |components| components)
    }

    pub fn without_payout_account(fee: &str) -> Self {
        Self::build(fee, false, |components| components)
    }

    pub fn with_components<F>(fee: &str, customize: F) -> Self
    where
        F: FnOnce(SettlementComponents) -> SettlementComponents,
    {
        Self::build(fee, true, customize)
    }

    fn build<F>(fee: &str, link_payout: bool, customize: F) -> Self
    where
        F: FnOnce(SettlementComponents) -> SettlementComponents,
    {
        let store = Arc::new(InMemorySettlementStore::new());
        let gateway = Arc::new(ScriptedGateway::default());

        let artist_id = Uuid::new_v4();
        let curator_id = Uuid::new_v4();
        store.add_user(artist_id, 0);
        store.add_user(curator_id, 0);
        if link_payout {
            store.link_payout_account(curator_id, CURATOR_EMAIL);
        }

        let submission_id = Uuid::new_v4();
        store.add_submission(Submission {
            id: submission_id,
            artist_id,
            status: "awaiting_payment".to_string(),
            playlist: PlaylistRef {
                id: Uuid::new_v4(),
                creator_id: curator_id,
                name: "Late Night Lo-Fi".to_string(),
                submission_fee: BigDecimal::from_str(fee).unwrap(),
            },
            song: SongRef {
                title: "Midnight Static".to_string(),
            },
        });

        let components =
            SettlementComponents::from_store(store.clone(), gateway.clone(), "USD".to_string());
        let service = Arc::new(SettlementService::new(customize(components)));

        Self {
            store,
            gateway,
            service,
            artist_id,
            curator_id,
            submission_id,
        }
    }

    pub fn set_curator_balance(&self, balance: i64) {
        self.store.add_user(self.curator_id, balance);
    }

    pub fn initiate_request(&self) -> settlement_core::services::InitiatePayment {
        settlement_core::services::InitiatePayment {
            submission_id: self.submission_id,
            payment_method_id: "paypal".to_string(),
            return_url: "https://app.example.com/payments/return".to_string(),
            cancel_url: "https://app.example.com/payments/cancel".to_string(),
        }
    }
}

pub fn major(amount: &str) -> BigDecimal {
    BigDecimal::from_str(amount).unwrap()
}
