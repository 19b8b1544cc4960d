//! Scripted decoder doubles shared by feeder and session tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DecoderError, Result};

use super::api::{
    DecodedFrame, DecoderCallbacks, DecoderConfig, DecoderFactory, DecoderState, EncodedChunk,
    VideoDecoder,
};

/// One recorded call into a scripted decoder
#[derive(Debug, Clone)]
pub(crate) enum DecoderCall {
    Configure(DecoderConfig),
    Decode(EncodedChunk),
    Close,
}

/// Call log shared across every instance a factory creates
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<DecoderCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<DecoderCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn configures(&self) -> Vec<DecoderConfig> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DecoderCall::Configure(cfg) => Some(cfg),
                _ => None,
            })
            .collect()
    }

    pub fn decodes(&self) -> Vec<EncodedChunk> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DecoderCall::Decode(chunk) => Some(chunk),
                _ => None,
            })
            .collect()
    }

    pub fn configure_count(&self) -> usize {
        self.configures().len()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes().len()
    }

    fn record(&self, call: DecoderCall) {
        self.0.lock().unwrap().push(call);
    }
}

/// Scripted decoder: records calls, synchronously emits one decoded frame
/// per accepted sample, and fails on demand.
pub(crate) struct ScriptedDecoder {
    log: CallLog,
    state: Arc<Mutex<DecoderState>>,
    fail_configure: Arc<AtomicBool>,
    fail_decode: Arc<AtomicBool>,
    callbacks: Arc<DecoderCallbacks>,
    queued: usize,
}

impl VideoDecoder for ScriptedDecoder {
    fn configure(&mut self, config: &DecoderConfig) -> Result<()> {
        self.log.record(DecoderCall::Configure(config.clone()));
        if self.fail_configure.load(Ordering::Acquire) {
            return Err(DecoderError::InvalidConfig("scripted failure".into()).into());
        }
        *self.state.lock().unwrap() = DecoderState::Configured;
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<()> {
        if *self.state.lock().unwrap() != DecoderState::Configured {
            return Err(DecoderError::Closed.into());
        }
        self.log.record(DecoderCall::Decode(chunk.clone()));
        if self.fail_decode.load(Ordering::Acquire) {
            return Err(DecoderError::DecodeFailed("scripted failure".into()).into());
        }
        // Emit the "decoded" frame immediately on the output callback.
        (self.callbacks.on_frame)(DecodedFrame {
            timestamp_us: chunk.timestamp_us,
            width: 0,
            height: 0,
            data: chunk.data,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.log.record(DecoderCall::Close);
        *self.state.lock().unwrap() = DecoderState::Closed;
    }

    fn state(&self) -> DecoderState {
        *self.state.lock().unwrap()
    }

    fn queue_depth(&self) -> usize {
        self.queued
    }
}

/// Factory for [`ScriptedDecoder`]s with shared failure switches
pub(crate) struct ScriptedFactory {
    pub log: CallLog,
    fail_configure: Arc<AtomicBool>,
    fail_decode: Arc<AtomicBool>,
    created: AtomicUsize,
    states: Mutex<Vec<Arc<Mutex<DecoderState>>>>,
    callbacks: Mutex<Option<Arc<DecoderCallbacks>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            fail_configure: Arc::new(AtomicBool::new(false)),
            fail_decode: Arc::new(AtomicBool::new(false)),
            created: AtomicUsize::new(0),
            states: Mutex::new(Vec::new()),
            callbacks: Mutex::new(None),
        }
    }

    pub fn fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::Release);
    }

    pub fn fail_decode(&self, fail: bool) {
        self.fail_decode.store(fail, Ordering::Release);
    }

    /// Number of decoder instances created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// State of the most recently created instance
    pub fn last_state(&self) -> Option<DecoderState> {
        self.states
            .lock()
            .unwrap()
            .last()
            .map(|s| *s.lock().unwrap())
    }

    /// Drive the most recent instance's asynchronous error callback
    pub fn emit_error(&self, err: DecoderError) {
        let callbacks = self.callbacks.lock().unwrap();
        let cb = callbacks.as_ref().expect("no decoder created yet");
        (cb.on_error)(err);
    }
}

impl DecoderFactory for ScriptedFactory {
    fn create(&self, callbacks: DecoderCallbacks) -> Result<Box<dyn VideoDecoder>> {
        let callbacks = Arc::new(callbacks);
        let state = Arc::new(Mutex::new(DecoderState::Unconfigured));
        self.states.lock().unwrap().push(state.clone());
        *self.callbacks.lock().unwrap() = Some(callbacks.clone());
        self.created.fetch_add(1, Ordering::Release);
        Ok(Box::new(ScriptedDecoder {
            log: self.log.clone(),
            state,
            fail_configure: self.fail_configure.clone(),
            fail_decode: self.fail_decode.clone(),
            callbacks,
            queued: 0,
        }))
    }
}
