use std::collections::BTreeSet;

use serde::Serialize;

use crate::csv_reader::Record;

/// The loaded bank-marketing table. Immutable once built.
#[derive(Debug, Default)]
pub struct Table {
    records: Vec<Record>,
}

impl Table {
    pub fn new(records: Vec<Record>) -> Self {
        Table { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Contact channels in order of first appearance.
    pub fn distinct_contacts(&self) -> Vec<String> {
        distinct(self.records().iter().map(|r| r.contact.as_str()))
    }

    /// Job types in order of first appearance.
    pub fn distinct_jobs(&self) -> Vec<String> {
        distinct(self.records().iter().map(|r| r.job.as_str()))
    }

    /// Rows whose contact channel and job are both selected, in table order.
    pub fn filter(&self, selection: &FilterSelection) -> Vec<&Record> {
        self.records()
            .iter()
            .filter(|r| selection.contacts.contains(&r.contact) && selection.jobs.contains(&r.job))
            .collect()
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

/// Selected contact channels and job types. Changing a selection produces a
/// new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSelection {
    contacts: BTreeSet<String>,
    jobs: BTreeSet<String>,
}

impl FilterSelection {
    pub fn new<C, J>(contacts: C, jobs: J) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        FilterSelection {
            contacts: contacts.into_iter().map(Into::into).collect(),
            jobs: jobs.into_iter().map(Into::into).collect(),
        }
    }

    /// Every channel and job observed in the table.
    pub fn all(table: &Table) -> Self {
        Self::new(table.distinct_contacts(), table.distinct_jobs())
    }

    pub fn contacts(&self) -> &BTreeSet<String> {
        &self.contacts
    }

    pub fn jobs(&self) -> &BTreeSet<String> {
        &self.jobs
    }

    pub fn has_contact(&self, contact: &str) -> bool {
        self.contacts.contains(contact)
    }

    pub fn has_job(&self, job: &str) -> bool {
        self.jobs.contains(job)
    }

    pub fn with_contacts<I>(&self, contacts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        FilterSelection {
            contacts: contacts.into_iter().map(Into::into).collect(),
            jobs: self.jobs.clone(),
        }
    }

    pub fn with_jobs<I>(&self, jobs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        FilterSelection {
            contacts: self.contacts.clone(),
            jobs: jobs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_contact_toggled(&self, contact: &str) -> Self {
        let mut next = self.clone();
        toggle(&mut next.contacts, contact);
        next
    }

    pub fn with_job_toggled(&self, job: &str) -> Self {
        let mut next = self.clone();
        toggle(&mut next.jobs, job);
        next
    }
}

fn toggle(set: &mut BTreeSet<String>, value: &str) {
    if !set.remove(value) {
        set.insert(value.to_string());
    }
}
