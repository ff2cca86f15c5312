//! Cascade Engine
//!
//! One engine per logical mutation: it owns the transaction slot and both response
//! builders, and is passed explicitly through the mutation's call chain.

use crate::config::{validation_failure, CascadeConfig};
use crate::entity::SharedEntity;
use crate::error::CascadeError;
use crate::invalidation::InvalidationStrategy;
use crate::response::{
    CascadeResponse, ResponseBuilder, ResponseError, StreamingCascadeResponse,
    StreamingResponseBuilder,
};
use crate::tracker::{CascadeData, TrackOutcome};
use crate::transaction::{TransactionGuard, TransactionManager};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct CascadeEngine {
    transactions: TransactionManager,
    responses: ResponseBuilder,
    streaming: StreamingResponseBuilder,
}

impl CascadeEngine {
    /// Validate `config` and build an idle engine
    pub fn new(
        config: CascadeConfig,
        strategy: Option<Arc<dyn InvalidationStrategy>>,
    ) -> Result<Self, CascadeError> {
        config.validate().map_err(validation_failure)?;

        let CascadeConfig {
            tracker, response, ..
        } = config;

        Ok(Self {
            transactions: TransactionManager::new(tracker)?,
            responses: ResponseBuilder::new(response.clone(), strategy.clone()),
            streaming: StreamingResponseBuilder::new(response, strategy),
        })
    }

    pub fn start_transaction(&mut self) -> Result<String, CascadeError> {
        self.transactions.start_transaction()
    }

    pub fn end_transaction(&mut self) -> Result<CascadeData, CascadeError> {
        self.transactions.end_transaction()
    }

    pub fn get_cascade_data(&self) -> Result<CascadeData, CascadeError> {
        self.transactions.get_cascade_data()
    }

    pub fn reset_transaction_state(&mut self) {
        self.transactions.reset_transaction_state()
    }

    /// Start a transaction that resets when the guard drops uncommitted
    pub fn begin(&mut self) -> Result<TransactionGuard<'_>, CascadeError> {
        self.transactions.begin()
    }

    pub async fn track_create(
        &mut self,
        entity: SharedEntity,
    ) -> Result<TrackOutcome, CascadeError> {
        self.transactions.track_create(entity).await
    }

    pub async fn track_create_as(
        &mut self,
        entity: SharedEntity,
        default_type: &str,
    ) -> Result<TrackOutcome, CascadeError> {
        self.transactions.track_create_as(entity, default_type).await
    }

    pub async fn track_update(
        &mut self,
        entity: SharedEntity,
    ) -> Result<TrackOutcome, CascadeError> {
        self.transactions.track_update(entity).await
    }

    pub async fn track_update_as(
        &mut self,
        entity: SharedEntity,
        default_type: &str,
    ) -> Result<TrackOutcome, CascadeError> {
        self.transactions.track_update_as(entity, default_type).await
    }

    pub fn track_delete(
        &mut self,
        type_name: &str,
        id: &str,
    ) -> Result<TrackOutcome, CascadeError> {
        self.transactions.track_delete(type_name, id)
    }

    pub fn build_response(
        &self,
        primary_result: Option<Value>,
        success: bool,
        errors: Vec<ResponseError>,
    ) -> CascadeResponse {
        self.responses
            .build_response(&self.transactions, primary_result, success, errors)
    }

    pub fn build_error_response(
        &self,
        errors: Vec<ResponseError>,
        primary_result: Option<Value>,
    ) -> CascadeResponse {
        self.responses
            .build_error_response(&self.transactions, errors, primary_result)
    }

    pub fn build_streaming_response(
        &self,
        primary_result: Option<Value>,
        success: bool,
        errors: Vec<ResponseError>,
    ) -> StreamingCascadeResponse<'_> {
        self.streaming
            .build_streaming_response(&self.transactions, primary_result, success, errors)
    }

    /// Build the response for the active transaction, then end it.
    ///
    /// `success` is true when `errors` is empty. Fails without building anything if no
    /// transaction is active.
    pub fn finish(
        &mut self,
        primary_result: Option<Value>,
        errors: Vec<ResponseError>,
    ) -> Result<CascadeResponse, CascadeError> {
        if !self.transactions.is_active() {
            return Err(CascadeError::TransactionState {
                expected: "active",
                actual: self.transactions.state().as_str(),
            });
        }

        let success = errors.is_empty();
        let response = self.build_response(primary_result, success, errors);
        self.transactions.end_transaction()?;
        Ok(response)
    }

    /// Build an error response from whatever was tracked, then reset. Never fails.
    pub fn fail(
        &mut self,
        errors: Vec<ResponseError>,
        primary_result: Option<Value>,
    ) -> CascadeResponse {
        let response = self.build_error_response(errors, primary_result);
        debug!(
            transaction_id = response.metadata().transaction_id.as_deref().unwrap_or_default(),
            errors = response.errors.len(),
            "mutation failed, discarding transaction"
        );
        self.transactions.reset_transaction_state();
        response
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn transactions_mut(&mut self) -> &mut TransactionManager {
        &mut self.transactions
    }
}
