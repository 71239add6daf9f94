//! Subcommand handlers

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tracing::{debug, info};

use ipintel_common::api::{EnrichmentApi, HttpEnrichmentApi};
use ipintel_common::config::ClientConfig;
use ipintel_common::events::{EventBus, IntelEvent};
use ipintel_common::ingest::{IngestionPipeline, IpInput};
use ipintel_common::keys::{FileStorage, KeyStateSynchronizer, KeyStore, Navigator, Page, Provider};
use ipintel_common::results::{Column, ResultTable};
use ipintel_common::validation::{ValidationStage, ValidationWorkflow};

use crate::render;

pub struct App {
    config: ClientConfig,
    store: KeyStore,
    bus: EventBus,
    api: Arc<HttpEnrichmentApi>,
    sync: KeyStateSynchronizer,
    navigator: Navigator,
    workflow: ValidationWorkflow,
    notifications: broadcast::Receiver<IntelEvent>,
}

impl App {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let storage_path = config.storage_file();
        debug!(path = %storage_path.display(), "Opening credential storage");
        let store = KeyStore::new(Arc::new(FileStorage::new(storage_path)));

        let bus = EventBus::default();
        let notifications = bus.subscribe();
        let sync = KeyStateSynchronizer::new(store.clone(), bus.clone());
        let navigator = Navigator::new(&sync.current());

        let api = Arc::new(
            HttpEnrichmentApi::new(config.api_url.clone(), config.request_timeout())
                .context("Failed to create HTTP client")?,
        );
        let workflow = ValidationWorkflow::with_redirect_delay(
            api.clone(),
            store.clone(),
            bus.clone(),
            config.redirect_delay(),
        );

        Ok(Self {
            config: config.clone(),
            store,
            bus,
            api,
            sync,
            navigator,
            workflow,
            notifications,
        })
    }

    fn flush(&mut self) -> usize {
        render::flush_notifications(&mut self.notifications)
    }

    /// Apply queued key-state changes and let the navigator follow them
    fn settle_key_state(&mut self) {
        let state = self.sync.process_pending();
        self.navigator.on_key_state(&state);
    }

    fn open_dashboard(&mut self) -> Result<()> {
        if !self.navigator.navigate_to(Page::Dashboard) {
            bail!("No API key configured. Add one with `ipintel keys add <provider> <key>`.");
        }
        Ok(())
    }

    fn table(&self) -> Arc<ResultTable> {
        Arc::new(ResultTable::new(self.api.clone(), self.bus.clone()))
    }

    async fn loaded_table(&mut self) -> Result<Arc<ResultTable>> {
        let table = self.table();
        if let Err(e) = table.refresh().await {
            self.flush();
            return Err(anyhow!(e).context("Could not load records"));
        }
        Ok(table)
    }

    pub fn keys_list(&mut self) -> Result<()> {
        let state = self.sync.process_pending();
        print!("{}", render::key_status(&self.store, &state));
        Ok(())
    }

    pub async fn keys_add(&mut self, provider: Provider, key: Option<String>) -> Result<()> {
        let key = match key {
            Some(key) => key,
            None => read_stdin().await?,
        };
        self.navigator.navigate_to(Page::Settings);

        let mut states = self.workflow.subscribe();
        let state = self.workflow.validate(provider, &key).await;
        self.settle_key_state();

        let message = state.text().unwrap_or_default().to_string();
        if state.stage != ValidationStage::Success {
            self.flush();
            bail!(message);
        }
        println!("{}", message);

        // Follow the redirect countdown until the workflow returns to idle
        while states.changed().await.is_ok() {
            let current = states.borrow_and_update().clone();
            match current.stage {
                ValidationStage::Redirecting => {
                    if let Some(message) = &current.message {
                        println!("{}", message);
                    }
                }
                ValidationStage::Idle => break,
                _ => {}
            }
        }

        while let Ok(event) = self.notifications.try_recv() {
            if self.navigator.on_event(&event) {
                info!("Dashboard unlocked");
            }
        }
        self.settle_key_state();
        println!(
            "{} of {} providers configured",
            self.sync.current().count,
            Provider::ALL.len()
        );
        Ok(())
    }

    pub fn keys_remove(&mut self, provider: Provider) -> Result<()> {
        let message = self.workflow.delete(provider)?;
        self.settle_key_state();
        println!("{}", message);
        if !self.navigator.can_navigate() {
            println!("No API keys remain; the dashboard is locked.");
        }
        Ok(())
    }

    pub async fn submit(
        &mut self,
        file: Option<PathBuf>,
        legacy: bool,
        key: Option<String>,
        ips: Vec<String>,
    ) -> Result<()> {
        self.open_dashboard()?;

        let input = match file {
            Some(path) => IpInput::from_file(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None if ips.is_empty() => IpInput::text(read_stdin().await?),
            None => IpInput::text(ips.join("\n")),
        };

        let pipeline = IngestionPipeline::new(
            self.api.clone(),
            self.table(),
            self.store.clone(),
            self.bus.clone(),
            self.config.stream_completion(),
        );

        let result = if legacy {
            pipeline.submit_legacy(key.as_deref(), &input).await
        } else {
            let printer = tokio::spawn(render::follow_progress(pipeline.subscribe_progress()));
            let result = pipeline.submit(key.as_deref(), &input).await;
            drop(pipeline);
            let _ = printer.await;
            result
        };

        let errors = self.flush();
        let report = result?;
        println!("{}", render::report_summary(&report));
        if report.aborted && errors > 0 {
            bail!("Submission {} did not complete", report.submission_id);
        }
        Ok(())
    }

    pub async fn list(&mut self, filters: Vec<(Column, String)>, json: bool) -> Result<()> {
        self.open_dashboard()?;
        let table = self.loaded_table().await?;
        for (column, text) in &filters {
            table.set_filter(*column, text).await;
        }

        let visible = table.visible().await;
        if json {
            println!("{}", serde_json::to_string_pretty(&visible)?);
        } else {
            print!("{}", render::records_table(&visible));
            println!("Showing {} of {} records", visible.len(), table.len().await);
        }
        Ok(())
    }

    pub async fn show(&mut self, id: i64) -> Result<()> {
        self.open_dashboard()?;
        let table = self.loaded_table().await?;
        println!("{}", table.details(id).await?);
        Ok(())
    }

    pub async fn delete(&mut self, ids: Vec<i64>) -> Result<()> {
        self.open_dashboard()?;
        let table = self.loaded_table().await?;

        let existing: Vec<i64> = table.records().await.iter().map(|r| r.id).collect();
        let (present, missing): (Vec<i64>, Vec<i64>) = ids.into_iter().partition(|id| existing.contains(id));
        for id in &missing {
            eprintln!("No record with id {}", id);
        }

        let result = match present.as_slice() {
            [] => Ok(0),
            [id] => table.delete(*id).await.map(|_| 1),
            _ => {
                for id in &present {
                    table.toggle_selected(*id).await;
                }
                table.bulk_delete_selected().await
            }
        };

        self.flush();
        let removed = result?;
        println!("Deleted {} record(s)", removed);
        Ok(())
    }

    pub async fn export(&mut self, output: Option<PathBuf>) -> Result<()> {
        self.open_dashboard()?;
        let table = self.loaded_table().await?;
        match output {
            Some(path) => {
                let count = table
                    .write_csv(&path)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Exported {} records to {}", count, path.display());
            }
            None => print!("{}", table.export_csv().await),
        }
        Ok(())
    }

    pub async fn info(&mut self) -> Result<()> {
        self.open_dashboard()?;
        let credential = self
            .store
            .primary_key()
            .ok_or_else(|| anyhow!("No API key configured"))?;
        let info = self.api.api_info(&credential).await?;
        print!("{}", render::api_info(&info));
        Ok(())
    }
}

async fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("Failed to read stdin")?;
    Ok(buf)
}
