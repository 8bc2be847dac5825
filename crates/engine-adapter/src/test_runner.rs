//! Batch testing against the test server.
//!
//! After registering the device, the runner waits for `start` messages. Each
//! one describes two engines; they are resolved to installed binaries, a
//! batch of game pairs is dispatched, and the results are reported back.
//! The loop ends when the server closes the connection.

use crate::device::Device;
use crate::dispatcher::{BatchContext, Capacity, Dispatcher, ResultAggregate};
use crate::game_pair::EngineSetup;
use crate::resolver::EngineResolver;
use crate::AdapterError;
use engine_com::test_flow::{EngineSpec, Start, TestCommand, TestFlow, TestMessage, TimeControl};
use engine_com::{Client, ComError, Event};
use uci::SearchBudget;

pub struct TestRunner {
    client: Client<TestFlow>,
    resolver: EngineResolver,
    dispatcher: Dispatcher,
    device: Device,
}

impl TestRunner {
    pub fn new(
        client: Client<TestFlow>,
        resolver: EngineResolver,
        dispatcher: Dispatcher,
        device: Device,
    ) -> Self {
        Self {
            client,
            resolver,
            dispatcher,
            device,
        }
    }

    /// Serve batches until the server disconnects or a batch fails.
    pub async fn run(mut self) -> Result<(), AdapterError> {
        let result = self.serve().await;
        self.client.close().await;
        result
    }

    async fn serve(&mut self) -> Result<(), AdapterError> {
        self.register().await?;

        loop {
            let start = match self.next_message().await? {
                Some(TestMessage::Start(start)) => start,
                Some(other) => {
                    return Err(AdapterError::UnexpectedMessage(format!(
                        "{:?} while waiting for a batch",
                        other
                    )))
                }
                None => {
                    tracing::info!("Test server closed the connection");
                    return Ok(());
                }
            };

            let batch = prepare_batch(&start, &mut self.resolver, self.device.capacity())?;
            tracing::info!(
                "Starting batch {} of suite {} ({} vs {})",
                batch.session,
                start.suite.id,
                batch.engines[0].name,
                batch.engines[1].name
            );

            let results = self
                .dispatcher
                .run(&batch, start.recommended_batch_size)
                .await?;
            self.client.send(report(&batch.session, results))?;
        }
    }

    async fn register(&mut self) -> Result<(), AdapterError> {
        self.client.send(TestCommand::Register {
            name: self.device.name.clone(),
            device_id: self.device.id.clone(),
            hardware: self.device.hardware.clone(),
        })?;

        match self.next_message().await? {
            Some(TestMessage::Registered(registered)) => {
                tracing::info!("Registered as {}", registered.id);
                Ok(())
            }
            Some(other) => Err(AdapterError::UnexpectedMessage(format!(
                "{:?} instead of a registration confirmation",
                other
            ))),
            None => Err(AdapterError::Com(ComError::Closed)),
        }
    }

    /// Next message, skipping recoverable errors. `None` once disconnected.
    async fn next_message(&mut self) -> Result<Option<TestMessage>, AdapterError> {
        loop {
            match self.client.next_event().await {
                Some(Event::Message(message)) => return Ok(Some(message)),
                Some(Event::Error(ComError::Closed)) | None => return Ok(None),
                Some(Event::Error(e)) => tracing::warn!("Ignoring server error: {}", e),
            }
        }
    }
}

/// Turn a `start` message into a batch with resolved engines.
pub fn prepare_batch(
    start: &Start,
    resolver: &mut EngineResolver,
    capacity: Capacity,
) -> Result<BatchContext, AdapterError> {
    let [first, second] = start.suite.engines.as_slice() else {
        return Err(AdapterError::InvalidBatch(format!(
            "expected two engines, got {}",
            start.suite.engines.len()
        )));
    };

    let mut setup = |spec: &EngineSpec| -> Result<EngineSetup, AdapterError> {
        Ok(EngineSetup {
            name: format!("{} {}", spec.name, spec.version),
            path: resolver.resolve(&spec.name, spec.version)?,
            hash: spec.options.hash,
            threads: spec.options.threads,
            budget: search_budget(&spec.time_control)?,
        })
    };

    let engines = [setup(first)?, setup(second)?];
    Ok(BatchContext::new(start.session.clone(), engines, capacity))
}

/// Search budget for a suite's time control.
pub fn search_budget(control: &TimeControl) -> Result<SearchBudget, AdapterError> {
    match control.kind.as_str() {
        "movetime" => Ok(SearchBudget::Time(control.value)),
        "depth" => u32::try_from(control.value)
            .map(SearchBudget::Depth)
            .map_err(|_| AdapterError::InvalidBatch(format!("depth {} too large", control.value))),
        other => Err(AdapterError::InvalidBatch(format!(
            "unknown time control '{}'",
            other
        ))),
    }
}

/// The `report` command for a finished batch.
pub fn report(session: &str, results: ResultAggregate) -> TestCommand {
    TestCommand::Report {
        session: session.to_string(),
        moves: results
            .records
            .into_iter()
            .map(|record| record.history.into())
            .collect(),
        logs: results.logs,
    }
}
