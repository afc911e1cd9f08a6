//! Runtime B executor: validator modules in an in-process Wasm isolate.
//!
//! Each run gets a fresh `Store` — its own heap, no shared mutable state
//! with the host. The payload goes in as JSON on WASI stdin and the
//! validator must write exactly one JSON message to stdout. Termination
//! is non-cooperative: when the deadline passes, the epoch ticker trips
//! the guest's epoch deadline and the isolate traps; the store is then
//! dropped, not asked to stop.

use std::time::Duration;

use wasmtime::{Engine, Linker, Module, Store, Trap};
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1;
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

use crate::error::{Result, ValidationError};
use crate::sandbox::config::EngineConfig;
use crate::sandbox::dispatch::ValidatorPayload;
use crate::sandbox::limits::IsolateState;
use crate::sandbox::outcome::{normalize_isolate_message, SandboxErrorKind, SandboxOutcome};

/// Executes Wasm validator modules in isolated execution contexts.
pub struct IsolateExecutor {
    max_memory: u64,
    max_fuel: Option<u64>,
    epoch_tick_interval: Duration,
}

impl IsolateExecutor {
    /// Create an executor, failing fast if the wasm engine configuration
    /// is unsupported on this platform.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Self::build_engine(config.max_fuel.is_some()).map_err(ValidationError::Internal)?;

        Ok(Self {
            max_memory: config.max_memory,
            max_fuel: config.max_fuel,
            epoch_tick_interval: config.epoch_tick_interval,
        })
    }

    /// Build an engine configured for epoch interruption.
    ///
    /// Each run gets its own engine: `increment_epoch` is engine-global,
    /// so sharing one engine across concurrent runs would advance every
    /// store's epoch once per ticker, burning each deadline budget K
    /// times faster with K runs in flight.
    fn build_engine(consume_fuel: bool) -> anyhow::Result<Engine> {
        let mut engine_config = wasmtime::Config::new();
        engine_config.epoch_interruption(true);
        engine_config.consume_fuel(consume_fuel);
        Engine::new(&engine_config)
            .map_err(|e| anyhow::anyhow!("failed to create wasm engine: {e}"))
    }

    /// Run one validator module against the payload.
    ///
    /// All failure modes fold into a `SandboxOutcome`; a message that is
    /// not a structured object with a boolean `valid` field is an error,
    /// never an implicit decision.
    pub async fn execute(
        &self,
        module_bytes: &[u8],
        payload: &ValidatorPayload,
        timeout: Duration,
    ) -> SandboxOutcome {
        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: format!("failed to encode payload: {e}"),
                }
            }
        };

        let engine = match Self::build_engine(self.max_fuel.is_some()) {
            Ok(engine) => engine,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: e.to_string(),
                }
            }
        };
        let module_bytes = module_bytes.to_vec();
        let max_memory = self.max_memory;
        let max_fuel = self.max_fuel;
        let tick_interval = self.epoch_tick_interval;

        // The guest traps once the ticker advances the epoch past its
        // deadline; ticks are sized so that happens right after `timeout`.
        let deadline_ticks =
            (timeout.as_millis() / tick_interval.as_millis().max(1)).max(1) as u64 + 1;

        let ticker_engine = engine.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                interval.tick().await;
                ticker_engine.increment_epoch();
            }
        });

        let exec = tokio::task::spawn_blocking(move || {
            Self::execute_sync(
                &engine,
                &module_bytes,
                &payload_json,
                max_memory,
                max_fuel,
                deadline_ticks,
            )
        });

        let outcome = match exec.await {
            Ok(outcome) => outcome,
            Err(e) => SandboxOutcome::Error {
                kind: SandboxErrorKind::Internal,
                detail: format!("isolate task panicked: {e}"),
            },
        };
        ticker.abort();
        outcome
    }

    /// Synchronous isolate execution (runs in a blocking task).
    fn execute_sync(
        engine: &Engine,
        module_bytes: &[u8],
        payload_json: &str,
        max_memory: u64,
        max_fuel: Option<u64>,
        deadline_ticks: u64,
    ) -> SandboxOutcome {
        let module = match Module::new(engine, module_bytes) {
            Ok(module) => module,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Crash,
                    detail: format!("failed to compile validator module: {e}"),
                }
            }
        };

        let stdin = MemoryInputPipe::new(payload_json.as_bytes().to_vec());
        let stdout = MemoryOutputPipe::new(1024 * 1024);
        let stderr = MemoryOutputPipe::new(256 * 1024);

        // No preopened directories, no network: the isolate sees only its
        // stdin payload and its stdout message channel.
        let wasi_ctx = WasiCtxBuilder::new()
            .stdin(stdin)
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .build_p1();

        let mut store = Store::new(engine, IsolateState::new(max_memory, wasi_ctx));
        store.limiter(|state| &mut state.limiter);
        store.epoch_deadline_trap();
        store.set_epoch_deadline(deadline_ticks);

        if let Some(fuel) = max_fuel {
            if let Err(e) = store.set_fuel(fuel) {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Internal,
                    detail: format!("failed to set fuel: {e}"),
                };
            }
        }

        let mut linker = Linker::new(engine);
        if let Err(e) =
            preview1::add_to_linker_sync(&mut linker, |state: &mut IsolateState| &mut state.wasi)
        {
            return SandboxOutcome::Error {
                kind: SandboxErrorKind::Internal,
                detail: format!("failed to link WASI: {e}"),
            };
        }

        let instance = match linker.instantiate(&mut store, &module) {
            Ok(instance) => instance,
            Err(e) => {
                if store.data().limiter.limit_exceeded() {
                    return SandboxOutcome::Error {
                        kind: SandboxErrorKind::MemoryLimit,
                        detail: "memory budget exceeded during instantiation".to_string(),
                    };
                }
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Crash,
                    detail: format!("failed to instantiate validator module: {e}"),
                };
            }
        };

        let entry = match instance.get_typed_func::<(), ()>(&mut store, "_start") {
            Ok(entry) => entry,
            Err(e) => {
                return SandboxOutcome::Error {
                    kind: SandboxErrorKind::Crash,
                    detail: format!("validator module has no _start entry point: {e}"),
                }
            }
        };

        let exit_code = match entry.call(&mut store, ()) {
            Ok(()) => 0,
            Err(e) => {
                if store.data().limiter.limit_exceeded() {
                    return SandboxOutcome::Error {
                        kind: SandboxErrorKind::MemoryLimit,
                        detail: "memory budget exceeded during execution".to_string(),
                    };
                }
                match e.downcast_ref::<Trap>() {
                    Some(Trap::Interrupt) => {
                        return SandboxOutcome::Error {
                            kind: SandboxErrorKind::Timeout,
                            detail: "isolate terminated at epoch deadline".to_string(),
                        }
                    }
                    Some(Trap::OutOfFuel) => {
                        return SandboxOutcome::Error {
                            kind: SandboxErrorKind::Timeout,
                            detail: "isolate ran out of fuel".to_string(),
                        }
                    }
                    _ => {}
                }
                match e.downcast_ref::<I32Exit>() {
                    Some(exit) => exit.0,
                    None => {
                        return SandboxOutcome::Error {
                            kind: SandboxErrorKind::Crash,
                            detail: format!("isolate trapped: {e}"),
                        }
                    }
                }
            }
        };

        // Exactly one structured message on stdout; four termination
        // routes (message, trap, exit, deadline) all land here or in the
        // returns above with the store torn down either way.
        let stdout_bytes = stdout.contents();
        if exit_code != 0 {
            let stderr_text = String::from_utf8_lossy(&stderr.contents()).to_string();
            return SandboxOutcome::Error {
                kind: SandboxErrorKind::Crash,
                detail: format!("isolate exited with code {exit_code}: {}", stderr_text.trim()),
            };
        }

        match serde_json::from_slice::<serde_json::Value>(&stdout_bytes) {
            Ok(message) => normalize_isolate_message(&message),
            Err(e) => SandboxOutcome::Error {
                kind: SandboxErrorKind::BadResponseFormat,
                detail: format!("validator message is not valid JSON: {e}"),
            },
        }
    }
}
