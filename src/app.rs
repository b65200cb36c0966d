//! Application root owning every long-lived component.
//!
//! Lifecycle:
//!
//! 1. [`App::load`] - parse configuration, resolve pools, build filters, sources, presets
//! 2. [`App::new_game`] or [`App::load_game`] - reset and seed, or restore and validate
//! 3. player actions through [`App::distributor`], sales through [`App::on_trigger`]
//! 4. [`App::save_game`] from the host's save callback

use std::sync::Arc;
use std::time::Instant;

use log::info;

use crate::api;
use crate::config::ini::{ConfigDir, IniDocument};
use crate::config::Settings;
use crate::container::{ContainerDisplay, ContainerRegistry, PickerEntry, SourceContext};
use crate::distribute::Distributor;
use crate::errors::StashError;
use crate::filter::{FilterRegistry, TraitEvaluator};
use crate::host::{FormId, Host};
use crate::network::preset::{load_container_lists, load_presets};
use crate::network::{LoadReport, NetworkManager, ValidationReport};
use crate::sales::{SaleReport, SaleTrigger, SalesScheduler};

pub struct App {
    pub settings: Settings,
    pub evaluator: TraitEvaluator,
    pub filters: FilterRegistry,
    pub containers: ContainerRegistry,
    pub manager: NetworkManager,
    pub sales: SalesScheduler,
    host: Arc<dyn Host>,
}

impl App {
    /// Build every component from a configuration directory.
    pub fn load(config: &ConfigDir, host: Arc<dyn Host>) -> Self {
        let documents: Vec<_> = config.documents().into_iter().map(|(_, doc)| doc).collect();
        let mut merged = IniDocument::default();
        for doc in &documents {
            merged.merge(doc.clone());
        }
        let settings = Settings::from_document(&merged);
        let evaluator = TraitEvaluator::init(&settings, host.as_ref());
        let filters = FilterRegistry::from_documents(&documents, &settings, host.as_ref());
        let containers = ContainerRegistry::with_default_sources(&settings);
        let manager = NetworkManager::with_definitions(
            load_presets(&merged, host.as_ref()),
            load_container_lists(&merged, host.as_ref()),
        );
        info!(
            "loaded {} config files: {} filters, {} presets, {} container lists",
            documents.len(),
            filters.len(),
            manager.presets().len(),
            manager.container_lists().len()
        );
        Self {
            settings,
            evaluator,
            filters,
            containers,
            manager,
            sales: SalesScheduler::new(),
            host,
        }
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn distributor(&self) -> Distributor<'_> {
        Distributor::new(&self.filters, &self.evaluator, &self.manager, self.host.as_ref())
    }

    pub fn source_context(&self) -> SourceContext<'_> {
        SourceContext {
            host: self.host.as_ref(),
            manager: &self.manager,
            settings: &self.settings,
        }
    }

    /// Start a fresh game: clear state and apply config seeds.
    pub fn new_game(&self) -> usize {
        self.manager.reset();
        self.manager.apply_config_seeds(&self.settings, self.host.as_ref())
    }

    pub fn save_game(&self) -> Vec<u8> {
        self.manager.save(self.host.as_ref())
    }

    /// Restore from a co-save blob and validate against the live world.
    pub fn load_game(&self, data: &[u8]) -> Result<(LoadReport, ValidationReport), StashError> {
        let loaded = self.manager.load(data, self.host.as_ref())?;
        let validated = self.validate();
        Ok((loaded, validated))
    }

    pub fn validate(&self) -> ValidationReport {
        self.manager
            .validate(self.host.as_ref(), self.settings.sales.interval_hours)
    }

    pub fn resolve_container(&self, container: FormId) -> ContainerDisplay {
        self.containers.resolve(&self.source_context(), container)
    }

    pub fn picker_list(&self, master: FormId) -> Vec<PickerEntry> {
        self.containers
            .build_picker_list(&self.source_context(), master)
    }

    pub fn count_items(&self, container: FormId) -> i64 {
        self.containers
            .count_items(&self.source_context(), container)
    }

    pub fn on_trigger(&self, trigger: SaleTrigger, now: Instant) -> Option<SaleReport> {
        self.sales.on_trigger(
            trigger,
            now,
            &self.manager,
            &self.settings,
            self.host.as_ref(),
        )
    }

    pub fn handle_message(&self, kind: u32, payload: &[u8]) -> Option<(u32, Vec<u8>)> {
        api::handle_message(kind, payload, &self.manager)
    }

    /// Charge the configured vendor cost and mark the vendor invested.
    pub fn invest_in_vendor(&self, npc: FormId) -> Result<(), StashError> {
        self.manager.invest_in_vendor(
            npc,
            self.settings.vendor_sales.vendor_cost,
            self.host.as_ref(),
        )
    }
}
