//! `ScriptedProvider`: a test double for [`ConnectionProvider`].
//!
//! Replays canned payloads in order and records every request, so executor
//! behavior can be checked without a MySQL server.

use crate::db::driver::{ConnectionProvider, ExecutionMode, SqlConnection};
use crate::error::{DbError, DbResult};
use crate::models::{RawPayload, SqlValue};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One `run` call as seen by a scripted connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Which connection handled the request, in checkout order from 1.
    pub connection_id: usize,
    pub sql: String,
    pub values: Vec<SqlValue>,
    pub mode: ExecutionMode,
}

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<DbResult<RawPayload>>,
    requests: Vec<RecordedRequest>,
    checkout_error: Option<DbError>,
    release_error: Option<DbError>,
    checkouts: usize,
    connects: usize,
    releases: usize,
    closed: bool,
}

/// A provider whose connections answer from a script.
///
/// Clones share the same script and recordings.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the payload for the next `run` call. Unscripted calls return an
    /// empty payload.
    pub fn push(&self, payload: RawPayload) {
        self.lock().responses.push_back(Ok(payload));
    }

    /// Queue a driver failure for the next `run` call.
    pub fn push_error(&self, error: DbError) {
        self.lock().responses.push_back(Err(error));
    }

    /// Make the next checkout or connect fail.
    pub fn fail_next_connection(&self, error: DbError) {
        self.lock().checkout_error = Some(error);
    }

    /// Make the next connection close fail.
    pub fn fail_next_release(&self, error: DbError) {
        self.lock().release_error = Some(error);
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Number of pooled connections handed out.
    pub fn checkouts(&self) -> usize {
        self.lock().checkouts
    }

    /// Number of standalone connections opened.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Number of connections explicitly closed.
    pub fn releases(&self) -> usize {
        self.lock().releases
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, pooled: bool) -> DbResult<ScriptedConnection> {
        let mut state = self.lock();
        if state.closed {
            return Err(DbError::connection(
                "Connection pool is closed",
                "Create a new executor",
            ));
        }
        if let Some(err) = state.checkout_error.take() {
            return Err(err);
        }
        if pooled {
            state.checkouts += 1;
        } else {
            state.connects += 1;
        }
        Ok(ScriptedConnection {
            id: state.checkouts + state.connects,
            provider: self.clone(),
        })
    }
}

/// A connection handed out by [`ScriptedProvider`].
#[derive(Debug)]
pub struct ScriptedConnection {
    id: usize,
    provider: ScriptedProvider,
}

impl ScriptedConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    async fn run(
        &mut self,
        sql: &str,
        values: &[SqlValue],
        mode: ExecutionMode,
    ) -> DbResult<RawPayload> {
        let mut state = self.provider.lock();
        state.requests.push(RecordedRequest {
            connection_id: self.id,
            sql: sql.to_string(),
            values: values.to_vec(),
            mode,
        });
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(RawPayload::default()))
    }

    async fn close(self) -> DbResult<()> {
        let mut state = self.provider.lock();
        state.releases += 1;
        match state.release_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    type Connection = ScriptedConnection;

    async fn checkout(&self) -> DbResult<ScriptedConnection> {
        self.open(true)
    }

    async fn connect(&self) -> DbResult<ScriptedConnection> {
        self.open(false)
    }

    async fn close(&self) {
        self.lock().closed = true;
    }
}
