use crate::record::{GoalRecord, GoalStatus, ImportedRecord, KpiFrequency, KpiRecord, RowView};
use crate::schema::{ColumnRule, ColumnSpec, Schema};
use crate::{ImportError, ImportResult};
use std::collections::HashMap;
use std::fmt;

pub const STRATEGIC_GOALS: &str = "strategic_goals";
pub const KPIS: &str = "kpis";

/// Builds the domain record for one row; `Err` is recorded against that row only.
pub type RowMapper = fn(&RowView<'_>) -> Result<ImportedRecord, String>;

/// Everything the pipeline needs to know about one import kind.
#[derive(Clone)]
pub struct KindSpec {
    pub kind: &'static str,
    pub schema: Schema,
    pub mapper: RowMapper,
    /// Store table the mapped records are written to.
    pub table: &'static str,
}

impl fmt::Debug for KindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindSpec")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("columns", &self.schema.columns.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<&'static str, KindSpec>,
}

impl KindRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(goals_spec());
        registry.register(kpis_spec());
        registry
    }

    /// Adds or replaces the entry for `spec.kind`.
    pub fn register(&mut self, spec: KindSpec) {
        self.kinds.insert(spec.kind, spec);
    }

    pub fn get(&self, kind: &str) -> ImportResult<&KindSpec> {
        self.kinds
            .get(kind)
            .ok_or_else(|| ImportError::UnknownKind(kind.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }
}

fn goals_spec() -> KindSpec {
    KindSpec {
        kind: STRATEGIC_GOALS,
        table: "strategic_goals",
        schema: Schema::new(vec![
            ColumnSpec::required("name", "Name"),
            ColumnSpec::optional("description", "Description"),
            ColumnSpec::optional("status", "Status").rule(ColumnRule::OneOf(GoalStatus::ALLOWED)),
            ColumnSpec::optional("progress", "Progress")
                .rule(ColumnRule::IntRange { min: 0, max: 100 }),
            ColumnSpec::optional("target_value", "Target value")
                .rule(ColumnRule::Number)
                .advisory(),
            ColumnSpec::optional("current_value", "Current value")
                .rule(ColumnRule::Number)
                .advisory(),
            ColumnSpec::optional("start_date", "Start date")
                .rule(ColumnRule::Date)
                .advisory(),
            ColumnSpec::optional("due_date", "Due date")
                .rule(ColumnRule::Date)
                .advisory(),
        ]),
        mapper: |row| GoalRecord::from_row(row).map(ImportedRecord::Goal),
    }
}

fn kpis_spec() -> KindSpec {
    KindSpec {
        kind: KPIS,
        table: "kpis",
        schema: Schema::new(vec![
            ColumnSpec::required("name", "Name"),
            ColumnSpec::optional("description", "Description"),
            ColumnSpec::optional("unit", "Unit"),
            ColumnSpec::optional("frequency", "Frequency")
                .rule(ColumnRule::OneOf(KpiFrequency::ALLOWED)),
            ColumnSpec::optional("target_value", "Target value")
                .rule(ColumnRule::Number)
                .advisory(),
            ColumnSpec::optional("current_value", "Current value")
                .rule(ColumnRule::Number)
                .advisory(),
            ColumnSpec::optional("goal_id", "Goal id"),
        ]),
        mapper: |row| KpiRecord::from_row(row).map(ImportedRecord::Kpi),
    }
}
