//! CLI runner - executes commands
//!
//! Every command writes JSON lines to stdout. Logs go to stderr.

use crate::cli::commands::{Cli, Commands, ModeArg, OutputFormat};
use crate::config::TapConfig;
use crate::engine::{BatchReport, Message};
use crate::error::{Error, Result, ResultExt};
use crate::tap::Tap;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    ///
    /// `cancel` is triggered by the caller on Ctrl-C.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let config = self.load_config()?;
        match &self.cli.command {
            Commands::Check => self.check(config, &cancel).await,
            Commands::Discover => self.discover(config, &cancel).await,
            Commands::Entities => self.entities(config, &cancel).await,
            Commands::Read {
                entities,
                concurrency,
                mode,
            } => {
                let config =
                    Self::apply_read_overrides(config, entities.as_deref(), *concurrency, *mode);
                self.read(config, cancel).await
            }
        }
    }

    /// Load the config file and apply global flags
    fn load_config(&self) -> Result<TapConfig> {
        let mut config = TapConfig::from_file(&self.cli.config)
            .with_context(|| format!("cannot use {}", self.cli.config.display()))?;
        if let Some(state) = &self.cli.state {
            config.state_path = Some(state.clone());
        }
        Ok(config)
    }

    /// Fold `read` flags into the config
    fn apply_read_overrides(
        mut config: TapConfig,
        entities: Option<&str>,
        concurrency: Option<usize>,
        mode: Option<ModeArg>,
    ) -> TapConfig {
        if let Some(patterns) = entities {
            config.discovery.include = patterns
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(concurrency) = concurrency {
            config.sync.concurrency = concurrency.max(1);
        }
        if let Some(mode) = mode {
            config.sync.mode = mode.into();
            for entity in config.entities.values_mut() {
                entity.mode = None;
            }
        }
        config
    }

    async fn check(&self, config: TapConfig, cancel: &CancellationToken) -> Result<()> {
        info!("Checking connection to {}", config.base_url);
        let tap = Tap::new(config).await?;
        let result = tap.check(cancel).await;

        let status = if result.success { "SUCCEEDED" } else { "FAILED" };
        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": status,
                "entities": result.entities,
                "message": result.message,
            }
        }));

        if result.success {
            Ok(())
        } else {
            Err(Error::Other("connection check failed".to_string()))
        }
    }

    async fn discover(&self, config: TapConfig, cancel: &CancellationToken) -> Result<()> {
        let tap = Tap::new(config).await?;
        let catalog = tap.discover(cancel).await?;
        self.output_message(&json!({
            "type": "CATALOG",
            "catalog": catalog,
        }));
        Ok(())
    }

    async fn entities(&self, config: TapConfig, cancel: &CancellationToken) -> Result<()> {
        let tap = Tap::new(config).await?;
        let entities = tap.entities(cancel).await?;
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        self.output_message(&json!({
            "type": "ENTITIES",
            "entities": names,
        }));
        Ok(())
    }

    async fn read(&self, config: TapConfig, cancel: CancellationToken) -> Result<()> {
        let tap = Arc::new(Tap::new(config).await?);
        let (messages, handle) = tap.read_stream(cancel);

        futures::pin_mut!(messages);
        while let Some(message) = messages.next().await {
            self.output_engine_message(&message);
        }

        let report = handle
            .await
            .map_err(|e| Error::Other(format!("read task failed: {e}")))??;

        self.output_message(&json!({
            "type": "REPORT",
            "report": report,
        }));

        Self::exit_status(&report)
    }

    /// Map a finished batch onto the process result
    ///
    /// A partial batch still fails the command after its report is written.
    fn exit_status(report: &BatchReport) -> Result<()> {
        if let Some(reason) = &report.aborted {
            return Err(Error::Other(format!("run aborted: {reason}")));
        }
        if !report.is_success() {
            warn!("{} entities did not complete", report.failures());
            return Err(Error::Other(format!(
                "{} of {} entities did not complete",
                report.failures(),
                report.outcomes.len()
            )));
        }
        Ok(())
    }

    fn output_engine_message(&self, message: &Message) {
        match message {
            Message::Records { entity, records } => {
                for record in records {
                    self.output_message(&json!({
                        "type": "RECORD",
                        "entity": entity,
                        "record": record,
                    }));
                }
            }
            Message::Bookmark { bookmark } => self.output_message(&json!({
                "type": "BOOKMARK",
                "bookmark": bookmark,
            })),
            Message::Outcome(outcome) => self.output_message(&json!({
                "type": "OUTCOME",
                "outcome": outcome,
            })),
        }
    }

    fn output_message<T: Serialize>(&self, msg: &T) {
        let line = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(msg),
            OutputFormat::Pretty => serde_json::to_string_pretty(msg),
        };
        println!("{}", line.unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EntityOutcome, EntityStatus};
    use crate::types::SyncMode;

    fn config() -> TapConfig {
        TapConfig::from_str(
            "base_url: http://localhost\nentities:\n  item:\n    mode: full_table\n",
        )
        .unwrap()
    }

    #[test]
    fn test_read_overrides() {
        let config = Runner::apply_read_overrides(
            config(),
            Some("inv*, order,"),
            Some(0),
            Some(ModeArg::Incremental),
        );

        assert_eq!(config.discovery.include, vec!["inv*", "order"]);
        assert_eq!(config.sync.concurrency, 1);
        assert_eq!(config.mode_for("item"), SyncMode::Incremental);
    }

    fn outcome(entity: &str, status: EntityStatus) -> EntityOutcome {
        EntityOutcome {
            entity: entity.to_string(),
            mode: SyncMode::FullTable,
            status,
            records: 0,
            pages: 0,
            retries: 0,
        }
    }

    #[test]
    fn test_partial_batch_fails_the_command() {
        let complete = BatchReport {
            outcomes: vec![outcome("item", EntityStatus::Completed)],
            aborted: None,
        };
        assert!(Runner::exit_status(&complete).is_ok());

        let partial = BatchReport {
            outcomes: vec![
                outcome("item", EntityStatus::Completed),
                outcome(
                    "order",
                    EntityStatus::Rejected {
                        reason: "no replication key".to_string(),
                    },
                ),
            ],
            aborted: None,
        };
        let err = Runner::exit_status(&partial).unwrap_err();
        assert!(err.to_string().contains("1 of 2 entities"));

        let aborted = BatchReport {
            outcomes: vec![outcome("item", EntityStatus::Cancelled)],
            aborted: Some("HTTP 401".to_string()),
        };
        let err = Runner::exit_status(&aborted).unwrap_err();
        assert!(err.to_string().contains("run aborted"));
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let config = Runner::apply_read_overrides(config(), None, None, None);
        assert!(config.discovery.include.is_empty());
        assert_eq!(config.mode_for("item"), SyncMode::FullTable);
        assert_eq!(config.mode_for("order"), SyncMode::FullTable);
    }
}
