//! In-memory tracking service for testing.

use crate::TrackingService;
use crate::error::{ErrorKind, Result};
use crate::record::{EntityRef, EntityType, Fields, Filter, Order, Record, Relation};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory tracking service for testing.
///
/// Records live in a map behind a [`Mutex`], so all trait methods work on
/// `&self`. Filters, dotted link fields and ordering behave like the real
/// service for the `is`/`is_not` relations the pipeline uses. Failures can be
/// queued with [`fail_next`](Self::fail_next) to exercise retry and
/// degradation paths.
///
/// # Examples
///
/// ```
/// use nox_tracking::{EntityType, Filter, MockTracking, TrackingService};
/// use serde_json::json;
///
/// let mock = MockTracking::default();
/// let id = mock.insert(EntityType::Shot, [("code", json!("SH010"))]);
///
/// let found = mock.find_one(EntityType::Shot, &[Filter::is("code", "SH010")], &["code"], &[]).unwrap();
/// assert_eq!(found.map(|shot| shot.id), Some(id));
/// ```
pub struct MockTracking {
    name: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    records: BTreeMap<EntityType, Vec<Record>>,
    next_id: i64,
    /// Scripted outcomes for upcoming calls; `None` lets a call through.
    script: VecDeque<Option<ErrorKind>>,
    calls: usize,
}
impl State {
    fn get(&self, link: EntityRef) -> Option<&Record> {
        self.records.get(&link.entity_type)?.iter().find(|record| record.id == link.id)
    }

    /// Resolve `field` on `record`, following `link.Type.field` hops.
    fn resolve(&self, record: &Record, field: &str) -> Option<Value> {
        if field == "id" {
            return Some(Value::from(record.id));
        }
        let mut parts = field.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(link), Some(type_name), Some(rest)) => {
                let link = record.entity(link)?;
                if link.entity_type.to_string() != type_name {
                    return None;
                }
                self.resolve(self.get(link)?, rest)
            },
            _ => record.fields.get(field).cloned(),
        }
    }

    fn matches(&self, record: &Record, filter: &Filter) -> bool {
        let actual = self.resolve(record, &filter.field);
        let equal = match (&filter.value, actual.as_ref()) {
            // Links and other objects match on the keys the filter names.
            (Value::Object(expected), Some(Value::Object(actual))) => {
                expected.iter().all(|(key, value)| actual.get(key) == Some(value))
            },
            (Value::Null, None | Some(Value::Null)) => true,
            (expected, Some(actual)) => expected == actual,
            (_, None) => false,
        };
        match filter.relation {
            Relation::Is => equal,
            Relation::IsNot => !equal,
        }
    }

    fn compare(&self, a: &Record, b: &Record, order: &[Order]) -> Ordering {
        for key in order {
            let ordering = compare_values(self.resolve(a, &key.field), self.resolve(b, &key.field));
            let ordering = if key.descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }
}

/// Numbers numerically, strings lexically, missing values first.
fn compare_values(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
        },
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(&b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl MockTracking {
    /// Change the name of the mock service.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a call, or fail it if a failure is queued.
    fn begin_call(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls += 1;
        if let Some(Some(failure)) = state.script.pop_front() {
            exn::bail!(failure);
        }
        Ok(state)
    }

    /// Seed a record directly, bypassing failure injection and call counting.
    pub fn insert<'a>(&self, entity_type: EntityType, fields: impl IntoIterator<Item = (&'a str, Value)>) -> i64 {
        let fields = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.records.entry(entity_type).or_default().push(Record::new(entity_type, id, fields));
        id
    }

    /// Fail the next `count` calls with errors built by `make`.
    pub fn fail_next(&self, count: usize, make: impl Fn() -> ErrorKind) {
        self.fail_after(0, count, make);
    }

    /// Let `successes` calls through, then fail the following `count`.
    pub fn fail_after(&self, successes: usize, count: usize, make: impl Fn() -> ErrorKind) {
        let mut state = self.state();
        state.script.extend((0..successes).map(|_| None));
        state.script.extend((0..count).map(|_| Some(make())));
    }

    /// Calls made through the [`TrackingService`] trait so far.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    /// Snapshot of every stored record of `entity_type`, in creation order.
    pub fn records(&self, entity_type: EntityType) -> Vec<Record> {
        self.state().records.get(&entity_type).cloned().unwrap_or_default()
    }
}
impl Default for MockTracking {
    fn default() -> Self {
        Self { name: "mock".to_string(), state: Mutex::new(State::default()) }
    }
}

impl TrackingService for MockTracking {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_one(
        &self,
        entity_type: EntityType,
        filters: &[Filter],
        fields: &[&str],
        order: &[Order],
    ) -> Result<Option<Record>> {
        let state = self.begin_call()?;
        let Some(records) = state.records.get(&entity_type) else {
            return Ok(None);
        };
        let best = records
            .iter()
            .filter(|record| filters.iter().all(|filter| state.matches(record, filter)))
            .min_by(|a, b| state.compare(a, b, order));
        Ok(best.map(|record| {
            let projected = fields
                .iter()
                .map(|field| (field.to_string(), state.resolve(record, field).unwrap_or(Value::Null)))
                .collect();
            Record::new(entity_type, record.id, projected)
        }))
    }

    fn create(&self, entity_type: EntityType, data: &Fields) -> Result<Record> {
        let mut state = self.begin_call()?;
        state.next_id += 1;
        let record = Record::new(entity_type, state.next_id, data.clone());
        state.records.entry(entity_type).or_default().push(record.clone());
        Ok(record)
    }

    fn update(&self, entity_type: EntityType, id: i64, data: &Fields) -> Result<Record> {
        let mut state = self.begin_call()?;
        let record = state.records.get_mut(&entity_type).and_then(|records| records.iter_mut().find(|r| r.id == id));
        let Some(record) = record else {
            exn::bail!(ErrorKind::Rejected { status: 404, message: format!("{entity_type} {id} not found") });
        };
        record.fields.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(record.clone())
    }
}
