//! Master (initiator) pipeline.
//!
//! One outstanding transaction at a time: a request is encoded by its
//! command-let, transmitted, and — unless it was a broadcast — the pipeline
//! waits for the response, validates it and hands the payload to the typed
//! listener callbacks.

pub mod cmdlet;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::MasterConfig;
use crate::cursor::BufferEmitter;
use crate::errors::{MasterError, StackError};
use crate::frame::{Frame, FrameFlags, ReceivedFrame, BROADCAST_ADDRESS, EXCEPTION_BIT};
use crate::master::cmdlet::Command;
use crate::transmission::Transmission;

/// Transaction lifecycle, observable through [`Master::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    RequestBuilding,
    Transmitting,
    AwaitingResponse,
    ResponseParsing,
}

/// The master pipeline over one transmission core.
pub struct Master {
    core: Arc<Transmission>,
    config: MasterConfig,
    busy: tokio::sync::Mutex<()>,
    state: Mutex<TransactionState>,
}

impl Master {
    pub fn new(core: Arc<Transmission>, config: MasterConfig) -> Result<Self, StackError> {
        config.validate()?;
        Ok(Self {
            core,
            config,
            busy: tokio::sync::Mutex::new(()),
            state: Mutex::new(TransactionState::Idle),
        })
    }

    /// Current point in the transaction lifecycle.
    pub fn state(&self) -> TransactionState {
        *self.state.lock().expect("master state poisoned")
    }

    pub fn is_busy(&self) -> bool {
        self.state() != TransactionState::Idle
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock().expect("master state poisoned") = state;
    }

    /// Runs one transaction. Fails immediately with
    /// [`MasterError::StillBusy`] while another transaction is active.
    ///
    /// For a broadcast request (`slave_address` 0) the call completes right
    /// after transmission; no response is expected. `timeout` of `None`
    /// uses the configured default.
    pub async fn submit<C: Command>(
        &self,
        slave_address: u8,
        request: &C::Request,
        listener: &mut C::Listener,
        timeout: Option<Duration>,
    ) -> Result<(), MasterError> {
        let _guard = self.busy.try_lock().map_err(|_| MasterError::StillBusy)?;
        let timeout =
            timeout.unwrap_or(Duration::from_millis(self.config.default_timeout_ms));

        let result = self
            .run_transaction::<C>(slave_address, request, listener, timeout)
            .await;
        self.set_state(TransactionState::Idle);
        result
    }

    async fn run_transaction<C: Command>(
        &self,
        slave_address: u8,
        request: &C::Request,
        listener: &mut C::Listener,
        timeout: Duration,
    ) -> Result<(), MasterError> {
        self.set_state(TransactionState::RequestBuilding);
        let mut scratch = vec![0u8; self.config.tx_buffer_capacity];
        let mut emitter = BufferEmitter::new(&mut scratch);
        C::build(request, &mut emitter)?;
        let written = emitter.written();
        let frame = Frame::new(slave_address, C::FUNCTION, scratch[..written].to_vec());

        self.set_state(TransactionState::Transmitting);
        self.core
            .transmit(&frame)
            .await
            .map_err(transmit_error)?;

        if slave_address == BROADCAST_ADDRESS {
            trace!(
                function = %format_args!("{:#04x}", C::FUNCTION),
                "broadcast transaction complete after transmit"
            );
            return Ok(());
        }

        self.set_state(TransactionState::AwaitingResponse);
        let received = match self.core.wait_frame(timeout).await {
            Ok(Some(received)) => received,
            Ok(None) => {
                self.core.drop_partial_receive();
                debug!(
                    slave = slave_address,
                    function = %format_args!("{:#04x}", C::FUNCTION),
                    "transaction timed out"
                );
                return Err(MasterError::Timeout(timeout));
            }
            Err(err) => return Err(err.into()),
        };

        self.set_state(TransactionState::ResponseParsing);
        self.handle_response::<C>(slave_address, request, listener, received)
    }

    fn handle_response<C: Command>(
        &self,
        slave_address: u8,
        request: &C::Request,
        listener: &mut C::Listener,
        received: ReceivedFrame,
    ) -> Result<(), MasterError> {
        if received.flags.contains(FrameFlags::BUFFER_OVERFLOW) {
            // The response did not fit the receive buffer.
            return Err(MasterError::RxBufferLow);
        }
        if !received.is_deliverable() {
            return Err(MasterError::rx_invalid_format(format!(
                "response damaged: {:?}",
                received.flags
            )));
        }
        let frame = received.frame;
        if frame.address != slave_address {
            return Err(MasterError::RxInvalidSlave {
                expected: slave_address,
                received: frame.address,
            });
        }

        if frame.function == C::FUNCTION | EXCEPTION_BIT {
            let code = frame.data.first().ok_or(MasterError::RxTruncated)?;
            debug!(
                slave = slave_address,
                function = %format_args!("{:#04x}", C::FUNCTION),
                code = %format_args!("{code:#04x}"),
                "exception response"
            );
            C::deliver_exception(listener, *code);
            return Ok(());
        }
        if frame.function != C::FUNCTION {
            return Err(MasterError::RxInvalidFunction {
                expected: C::FUNCTION,
                received: frame.function,
            });
        }
        C::parse(request, &frame.data, listener)
    }
}

fn transmit_error(err: StackError) -> MasterError {
    match err {
        StackError::Device(device) => MasterError::Device(device),
        other => MasterError::TxBadRequest(other.to_string()),
    }
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
