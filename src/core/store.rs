use std::collections::HashSet;

use chrono::NaiveDateTime;

use super::schedule::{ScheduleId, ScheduleRecord};

/// Pending schedules in the order the service returned them.
///
/// Ids are unique. Nothing here re-sorts and nothing here talks to the network;
/// `remove`/`update_time` on an unknown id leave the list as it was.
#[derive(Debug, Clone, Default)]
pub struct ScheduleListStore {
    records: Vec<ScheduleRecord>,
}

impl ScheduleListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list. Later duplicates of an id are dropped.
    pub fn replace_all(&mut self, records: Vec<ScheduleRecord>) {
        let mut seen = HashSet::with_capacity(records.len());
        let before = records.len();
        self.records = records
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect();
        if self.records.len() != before {
            log::warn!(
                "Dropped {} duplicate schedule(s) from listing",
                before - self.records.len()
            );
        }
    }

    /// Append a confirmed record. An existing record with the same id is replaced in place.
    pub fn append(&mut self, record: ScheduleRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn remove(&mut self, id: &ScheduleId) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != *id);
        self.records.len() != before
    }

    pub fn update_time(&mut self, id: &ScheduleId, scheduled_at: NaiveDateTime) -> bool {
        match self.records.iter_mut().find(|r| r.id == *id) {
            Some(record) => {
                record.scheduled_at = scheduled_at;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ScheduleId) -> Option<&ScheduleRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    pub fn contains(&self, id: &ScheduleId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ScheduleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
