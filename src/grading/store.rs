use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::audit::{AuditError, AuditEvent, AuditSink};
use super::domain::{
    Component, ComponentId, ComponentWeight, GradedItem, GradedScore, GradingScheme, ItemId,
    ProfileId, RosterMember, RunId, SchemeId, SectionId, SectionProfile, StudentId, TableId,
    TransmutationRow, TransmutationTable, WeightProfile,
};
use super::outcome::{ComputeRun, ComputedGrade};
use super::repository::{ConfigStore, RepositoryError, RunStore, SectionStore};

#[derive(Default)]
struct StoreInner {
    schemes: HashMap<SchemeId, GradingScheme>,
    components: HashMap<ComponentId, Component>,
    profiles: HashMap<ProfileId, WeightProfile>,
    weights: Vec<ComponentWeight>,
    tables: HashMap<TableId, TransmutationTable>,
    rows: Vec<TransmutationRow>,
    sections: HashMap<SectionId, SectionProfile>,
    syllabus_subjects: HashMap<String, Vec<String>>,
    items: HashMap<ItemId, GradedItem>,
    scores: Vec<GradedScore>,
    roster: Vec<RosterMember>,
    runs: HashMap<RunId, ComputeRun>,
    grades: HashMap<(RunId, StudentId), ComputedGrade>,
}

/// Single-process store backing the service binary and the test suites.
/// Every operation takes the one interior lock, which also serializes
/// configuration batch replacement per process.
#[derive(Default, Clone)]
pub struct InMemoryGradeStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryGradeStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("grade store mutex poisoned")
    }

    pub fn insert_section(&self, section: SectionProfile) {
        self.lock().sections.insert(section.id.clone(), section);
    }

    pub fn insert_syllabus_subjects(&self, program_id: &str, subjects: Vec<String>) {
        self.lock()
            .syllabus_subjects
            .entry(program_id.to_string())
            .or_default()
            .extend(subjects);
    }

    pub fn insert_item(&self, item: GradedItem) {
        self.lock().items.insert(item.id.clone(), item);
    }

    pub fn insert_score(&self, score: GradedScore) {
        self.lock().scores.push(score);
    }

    pub fn insert_roster_member(&self, member: RosterMember) {
        self.lock().roster.push(member);
    }
}

impl ConfigStore for InMemoryGradeStore {
    fn scheme(&self, id: &SchemeId) -> Result<Option<GradingScheme>, RepositoryError> {
        Ok(self.lock().schemes.get(id).cloned())
    }

    fn insert_scheme(&self, scheme: GradingScheme) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if inner.schemes.contains_key(&scheme.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.schemes.insert(scheme.id.clone(), scheme);
        Ok(())
    }

    fn component(&self, id: &ComponentId) -> Result<Option<Component>, RepositoryError> {
        Ok(self.lock().components.get(id).cloned())
    }

    fn active_components(&self, scheme_id: &SchemeId) -> Result<Vec<Component>, RepositoryError> {
        let inner = self.lock();
        let mut components: Vec<Component> = inner
            .components
            .values()
            .filter(|component| &component.scheme_id == scheme_id)
            .filter(|component| component.archived_at.is_none())
            .cloned()
            .collect();
        components.sort_by_key(|component| (component.display_order, component.code.clone()));
        Ok(components)
    }

    fn insert_component(&self, component: Component) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if inner.components.contains_key(&component.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.components.insert(component.id.clone(), component);
        Ok(())
    }

    fn archive_component(
        &self,
        id: &ComponentId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        let component = inner.components.get_mut(id).ok_or(RepositoryError::NotFound)?;
        component.archived_at = Some(at);
        Ok(())
    }

    fn weight_profile(&self, id: &ProfileId) -> Result<Option<WeightProfile>, RepositoryError> {
        Ok(self.lock().profiles.get(id).cloned())
    }

    fn weight_profiles(&self, scheme_id: &SchemeId) -> Result<Vec<WeightProfile>, RepositoryError> {
        let inner = self.lock();
        let mut profiles: Vec<WeightProfile> = inner
            .profiles
            .values()
            .filter(|profile| &profile.scheme_id == scheme_id)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.profile_key.cmp(&b.profile_key));
        Ok(profiles)
    }

    fn insert_weight_profile(&self, profile: WeightProfile) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if inner.profiles.contains_key(&profile.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    fn archive_weight_profile(
        &self,
        id: &ProfileId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        let profile = inner.profiles.get_mut(id).ok_or(RepositoryError::NotFound)?;
        profile.archived_at = Some(at);
        Ok(())
    }

    fn active_weights(
        &self,
        scheme_id: &SchemeId,
        profile_id: Option<&ProfileId>,
    ) -> Result<Vec<ComponentWeight>, RepositoryError> {
        let inner = self.lock();
        let mut weights: Vec<ComponentWeight> = inner
            .weights
            .iter()
            .filter(|weight| &weight.scheme_id == scheme_id)
            .filter(|weight| weight.profile_id.as_ref() == profile_id)
            .filter(|weight| weight.archived_at.is_none())
            .cloned()
            .collect();
        weights.sort_by(|a, b| a.component_id.cmp(&b.component_id));
        Ok(weights)
    }

    fn replace_weights(
        &self,
        scheme_id: &SchemeId,
        profile_id: Option<&ProfileId>,
        entries: Vec<ComponentWeight>,
    ) -> Result<u32, RepositoryError> {
        let mut inner = self.lock();
        let now = Utc::now();

        let next_version = inner
            .weights
            .iter()
            .filter(|weight| &weight.scheme_id == scheme_id)
            .filter(|weight| weight.profile_id.as_ref() == profile_id)
            .map(|weight| weight.version)
            .max()
            .unwrap_or(0)
            + 1;

        // Archive and insert under the same lock so no reader sees an
        // empty active set between the two halves.
        for weight in inner
            .weights
            .iter_mut()
            .filter(|weight| &weight.scheme_id == scheme_id)
            .filter(|weight| weight.profile_id.as_ref() == profile_id)
            .filter(|weight| weight.archived_at.is_none())
        {
            weight.archived_at = Some(now);
        }

        for mut entry in entries {
            entry.version = next_version;
            entry.archived_at = None;
            inner.weights.push(entry);
        }

        Ok(next_version)
    }

    fn transmutation_table(
        &self,
        id: &TableId,
    ) -> Result<Option<TransmutationTable>, RepositoryError> {
        Ok(self.lock().tables.get(id).cloned())
    }

    fn insert_transmutation_table(
        &self,
        table: TransmutationTable,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if inner.tables.contains_key(&table.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.tables.insert(table.id.clone(), table);
        Ok(())
    }

    fn active_transmutation_rows(
        &self,
        table_id: &TableId,
    ) -> Result<Vec<TransmutationRow>, RepositoryError> {
        let inner = self.lock();
        let mut rows: Vec<TransmutationRow> = inner
            .rows
            .iter()
            .filter(|row| &row.table_id == table_id)
            .filter(|row| row.archived_at.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.initial_grade
                .partial_cmp(&a.initial_grade)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    fn replace_transmutation_rows(
        &self,
        table_id: &TableId,
        rows: Vec<TransmutationRow>,
    ) -> Result<u32, RepositoryError> {
        let mut inner = self.lock();
        let now = Utc::now();

        let table = inner
            .tables
            .get_mut(table_id)
            .ok_or(RepositoryError::NotFound)?;
        table.version += 1;
        let version = table.version;

        for row in inner
            .rows
            .iter_mut()
            .filter(|row| &row.table_id == table_id)
            .filter(|row| row.archived_at.is_none())
        {
            row.archived_at = Some(now);
        }

        for mut row in rows {
            row.table_id = table_id.clone();
            row.archived_at = None;
            inner.rows.push(row);
        }

        Ok(version)
    }
}

impl SectionStore for InMemoryGradeStore {
    fn section(&self, id: &SectionId) -> Result<Option<SectionProfile>, RepositoryError> {
        Ok(self.lock().sections.get(id).cloned())
    }

    fn syllabus_subjects(
        &self,
        program_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .syllabus_subjects
            .get(program_id)
            .map(|subjects| subjects.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn graded_items(
        &self,
        section_id: &SectionId,
        term: &str,
    ) -> Result<Vec<GradedItem>, RepositoryError> {
        let inner = self.lock();
        let mut items: Vec<GradedItem> = inner
            .items
            .values()
            .filter(|item| &item.section_id == section_id && item.term == term)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    fn scores_for_item(&self, item_id: &ItemId) -> Result<Vec<GradedScore>, RepositoryError> {
        let inner = self.lock();
        Ok(inner
            .scores
            .iter()
            .filter(|score| &score.item_id == item_id)
            .cloned()
            .collect())
    }

    fn active_roster(&self, section_id: &SectionId) -> Result<Vec<StudentId>, RepositoryError> {
        let inner = self.lock();
        let mut students: Vec<StudentId> = inner
            .roster
            .iter()
            .filter(|member| &member.section_id == section_id)
            .filter(|member| member.is_active())
            .map(|member| member.student_id.clone())
            .collect();
        students.sort();
        students.dedup();
        Ok(students)
    }
}

impl RunStore for InMemoryGradeStore {
    fn insert_run(&self, run: ComputeRun) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if inner.runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.runs.insert(run.id.clone(), run);
        Ok(())
    }

    fn update_run(&self, run: ComputeRun) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if !inner.runs.contains_key(&run.id) {
            return Err(RepositoryError::NotFound);
        }
        inner.runs.insert(run.id.clone(), run);
        Ok(())
    }

    fn run(&self, id: &RunId) -> Result<Option<ComputeRun>, RepositoryError> {
        Ok(self.lock().runs.get(id).cloned())
    }

    fn insert_grades(&self, grades: Vec<ComputedGrade>) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if grades.iter().any(|grade| {
            inner
                .grades
                .contains_key(&(grade.run_id.clone(), grade.student_id.clone()))
        }) {
            return Err(RepositoryError::Conflict);
        }
        for grade in grades {
            inner
                .grades
                .insert((grade.run_id.clone(), grade.student_id.clone()), grade);
        }
        Ok(())
    }

    fn grades_for_run(&self, id: &RunId) -> Result<Vec<ComputedGrade>, RepositoryError> {
        let inner = self.lock();
        let mut grades: Vec<ComputedGrade> = inner
            .grades
            .values()
            .filter(|grade| &grade.run_id == id)
            .cloned()
            .collect();
        grades.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(grades)
    }

    fn link_grade_entry(
        &self,
        run_id: &RunId,
        student_id: &StudentId,
        entry_id: &str,
    ) -> Result<ComputedGrade, RepositoryError> {
        let mut inner = self.lock();
        let grade = inner
            .grades
            .get_mut(&(run_id.clone(), student_id.clone()))
            .ok_or(RepositoryError::NotFound)?;
        if grade.grade_entry_id.is_some() {
            return Err(RepositoryError::Conflict);
        }
        grade.grade_entry_id = Some(entry_id.to_string());
        Ok(grade.clone())
    }
}

/// Audit sink that retains events for inspection; the default sink for the
/// service binary and the test suites.
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .expect("audit mutex poisoned")
            .push(event);
        Ok(())
    }
}
