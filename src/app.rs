use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use tui::widgets::ListState;

use crate::csv_reader::TableCache;
use crate::dataset::{FilterSelection, Table};
use crate::error::DataLoadError;
use crate::report::DashboardReport;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MenuItem {
    Overview,
    Trends,
    Jobs,
}

impl MenuItem {
    pub const ALL: [MenuItem; 3] = [MenuItem::Overview, MenuItem::Trends, MenuItem::Jobs];

    pub fn next(self) -> MenuItem {
        MenuItem::ALL[(usize::from(self) + 1) % MenuItem::ALL.len()]
    }
}

impl From<MenuItem> for usize {
    fn from(input: MenuItem) -> usize {
        match input {
            MenuItem::Overview => 0,
            MenuItem::Trends => 1,
            MenuItem::Jobs => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Focus {
    Channels,
    Jobs,
}

pub trait FilterControls {
    fn next_item(&mut self);
    fn previous_item(&mut self);
    fn toggle_focus(&mut self);
    fn toggle_highlighted(&mut self);
    fn select_all(&mut self);
    fn clear_all(&mut self);
    fn reload(&mut self);
    fn refresh_data(&mut self);
}

/// State behind the interactive dashboard: the cached table, the current
/// selection and the report derived from it.
pub struct Dashboard {
    cache: TableCache,
    table: Arc<Table>,
    contacts: Vec<String>,
    jobs: Vec<String>,
    selection: FilterSelection,
    report: DashboardReport,
    focus: Focus,
    pub active_menu_item: MenuItem,
    pub contact_state: ListState,
    pub job_state: ListState,
    status: Option<String>,
}

impl Dashboard {
    pub fn new(mut cache: TableCache) -> Result<Self, DataLoadError> {
        let table = cache.get()?;
        if table.is_empty() {
            warn!(path = %cache.path().display(), "data file has no rows");
        }
        let selection = FilterSelection::all(&table);
        let report = DashboardReport::build(&table, &selection);
        let mut dashboard = Dashboard {
            contacts: table.distinct_contacts(),
            jobs: table.distinct_jobs(),
            cache,
            table,
            selection,
            report,
            focus: Focus::Channels,
            active_menu_item: MenuItem::Overview,
            contact_state: ListState::default(),
            job_state: ListState::default(),
            status: None,
        };
        dashboard.reset_cursors();
        Ok(dashboard)
    }

    pub fn report(&self) -> &DashboardReport {
        &self.report
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn contacts(&self) -> &[String] {
        &self.contacts
    }

    pub fn jobs(&self) -> &[String] {
        &self.jobs
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn data_path(&self) -> &Path {
        self.cache.path()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Local>> {
        self.cache.loaded_at()
    }

    fn reset_cursors(&mut self) {
        self.contact_state
            .select(if self.contacts.is_empty() { None } else { Some(0) });
        self.job_state
            .select(if self.jobs.is_empty() { None } else { Some(0) });
    }

    fn focused(&mut self) -> (&[String], &mut ListState) {
        match self.focus {
            Focus::Channels => (&self.contacts, &mut self.contact_state),
            Focus::Jobs => (&self.jobs, &mut self.job_state),
        }
    }

    fn apply(&mut self, selection: FilterSelection) {
        debug!(
            contacts = selection.contacts().len(),
            jobs = selection.jobs().len(),
            "filter selection changed"
        );
        self.selection = selection;
        self.refresh_data();
    }
}

impl FilterControls for Dashboard {
    fn next_item(&mut self) {
        let (items, state) = self.focused();
        if items.is_empty() {
            return;
        }
        let next = state.selected().map_or(0, |i| (i + 1) % items.len());
        state.select(Some(next));
    }

    fn previous_item(&mut self) {
        let (items, state) = self.focused();
        if items.is_empty() {
            return;
        }
        let previous = state
            .selected()
            .map_or(0, |i| (i + items.len() - 1) % items.len());
        state.select(Some(previous));
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Channels => Focus::Jobs,
            Focus::Jobs => Focus::Channels,
        };
    }

    fn toggle_highlighted(&mut self) {
        let next = match self.focus {
            Focus::Channels => self
                .contact_state
                .selected()
                .and_then(|i| self.contacts.get(i))
                .map(|c| self.selection.with_contact_toggled(c)),
            Focus::Jobs => self
                .job_state
                .selected()
                .and_then(|i| self.jobs.get(i))
                .map(|j| self.selection.with_job_toggled(j)),
        };
        if let Some(selection) = next {
            self.apply(selection);
        }
    }

    fn select_all(&mut self) {
        let selection = match self.focus {
            Focus::Channels => self.selection.with_contacts(self.contacts.iter().cloned()),
            Focus::Jobs => self.selection.with_jobs(self.jobs.iter().cloned()),
        };
        self.apply(selection);
    }

    fn clear_all(&mut self) {
        let selection = match self.focus {
            Focus::Channels => self.selection.with_contacts(Vec::<String>::new()),
            Focus::Jobs => self.selection.with_jobs(Vec::<String>::new()),
        };
        self.apply(selection);
    }

    /// Re-reads the data file and resets the filters to every observed value.
    /// The dashboard keeps showing the current table if the read fails.
    fn reload(&mut self) {
        match self.cache.reload() {
            Ok(table) => {
                info!(rows = table.len(), "dashboard data reloaded");
                self.contacts = table.distinct_contacts();
                self.jobs = table.distinct_jobs();
                self.selection = FilterSelection::all(&table);
                self.table = table;
                self.status = None;
                self.reset_cursors();
                self.refresh_data();
            }
            Err(e) => {
                warn!(error = %e, "reload failed, keeping previous data");
                self.status = Some(format!("Reload failed: {}", e));
            }
        }
    }

    fn refresh_data(&mut self) {
        self.report = DashboardReport::build(&self.table, &self.selection);
    }
}
