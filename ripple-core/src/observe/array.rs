//! Array methods on views.
//!
//! Searches compare against raw elements, first with the needle as given and
//! then with the needle unwrapped, so a caller holding either the raw
//! container or its view finds it.
//!
//! Length-changing methods run with read recording paused. They read the
//! current length as part of their work, and recording that read would make
//! an effect that pushes depend on the length it changes.

use crate::error::ReactivityError;
use crate::reactive::{Key, Runtime, TrackOp, TriggerOp, UntrackedScope};

use super::handlers::stored_value;
use super::target::Target;
use super::value::Value;
use super::view::View;

#[derive(Clone, Copy)]
enum Search {
    Includes,
    First,
    Last,
}

impl View {
    /// Whether the array contains `needle` (`NaN` matches `NaN`).
    pub fn includes(&self, needle: &Value) -> bool {
        self.search(needle, Search::Includes).is_some()
    }

    /// Position of the first element strictly equal to `needle`.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.search(needle, Search::First)
    }

    /// Position of the last element strictly equal to `needle`.
    pub fn last_index_of(&self, needle: &Value) -> Option<usize> {
        self.search(needle, Search::Last)
    }

    fn search(&self, needle: &Value, search: Search) -> Option<usize> {
        let target = self.target();
        let items = target.data().items()?.to_vec();

        if !self.is_readonly() {
            Runtime::track(target, TrackOp::Get, Key::Length);
            for index in 0..items.len() {
                Runtime::track(target, TrackOp::Get, Key::Index(index));
            }
        }

        find(&items, needle, search).or_else(|| find(&items, &needle.to_raw(), search))
    }

    /// Append `value`, returning the new length. `None` for read-only views
    /// and non-arrays.
    pub fn push(&self, value: impl Into<Value>) -> Option<usize> {
        let value = stored_value(value.into(), self.is_shallow());
        let added = value.clone();
        self.edit(
            "push",
            |items| {
                items.push(value);
                items.len()
            },
            |target, &length| {
                Runtime::trigger(
                    target,
                    TriggerOp::Add,
                    Some(Key::Index(length - 1)),
                    Some(added),
                    None,
                );
            },
        )
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.edit(
            "pop",
            |items| items.pop().map(|value| (value, items.len())),
            |target, popped| {
                if let Some((_, length)) = popped {
                    Runtime::trigger(
                        target,
                        TriggerOp::Set,
                        Some(Key::Length),
                        Some(Value::from(*length)),
                        Some(Value::from(*length + 1)),
                    );
                }
            },
        )
        .flatten()
        .map(|(value, _)| value)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate("shift", |items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        })
        .flatten()
    }

    /// Prepend `value`, returning the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Option<usize> {
        let value = stored_value(value.into(), self.is_shallow());
        self.mutate("unshift", |items| {
            items.insert(0, value);
            items.len()
        })
    }

    /// Remove `delete_count` elements at `start` and insert `values` in
    /// their place. Both bounds are clamped to the array. Returns the
    /// removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Option<Vec<Value>> {
        let shallow = self.is_shallow();
        let values: Vec<Value> = values
            .into_iter()
            .map(|value| stored_value(value, shallow))
            .collect();
        self.mutate("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, values).collect()
        })
    }

    /// Apply `f` to the raw elements, then announce the element-wise
    /// difference.
    fn mutate<R>(&self, op: &'static str, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        self.edit(
            op,
            |items| {
                let before = items.clone();
                let result = f(items);
                (result, before, items.clone())
            },
            |target, (_, before, after)| notify_splice(target, before, after),
        )
        .map(|(result, _, _)| result)
    }

    /// Apply `apply` to the raw elements and then `notify`, both with
    /// recording paused. `None` for read-only views and non-arrays.
    fn edit<R>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut Vec<Value>) -> R,
        notify: impl FnOnce(&Target, &R),
    ) -> Option<R> {
        if self.is_readonly() {
            ReactivityError::ReadonlyTarget {
                op,
                key: "length".to_string(),
            }
            .report();
            return None;
        }

        let _untracked = UntrackedScope::new();
        let target = self.target();
        let result = {
            let mut data = target.data_mut();
            let items = data.items_mut()?;
            apply(items)
        };

        notify(target, &result);
        Some(result)
    }
}

fn find(items: &[Value], needle: &Value, search: Search) -> Option<usize> {
    match search {
        Search::Includes => items.iter().position(|item| item.same_value_zero(needle)),
        Search::First => items.iter().position(|item| item.strict_equals(needle)),
        Search::Last => items.iter().rposition(|item| item.strict_equals(needle)),
    }
}

/// Announce the element-wise difference between two states of an array.
fn notify_splice(target: &Target, before: &[Value], after: &[Value]) {
    for (index, value) in after.iter().enumerate() {
        match before.get(index) {
            None => Runtime::trigger(
                target,
                TriggerOp::Add,
                Some(Key::Index(index)),
                Some(value.clone()),
                None,
            ),
            Some(old) if !old.same_value(value) => Runtime::trigger(
                target,
                TriggerOp::Set,
                Some(Key::Index(index)),
                Some(value.clone()),
                Some(old.clone()),
            ),
            Some(_) => {}
        }
    }

    if after.len() < before.len() {
        Runtime::trigger(
            target,
            TriggerOp::Set,
            Some(Key::Length),
            Some(Value::from(after.len())),
            Some(Value::from(before.len())),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::observe::{reactive, readonly};
    use crate::reactive::{effect, EffectOptions};

    fn numbers(values: &[i32]) -> Target {
        Target::from_values(values.iter().map(|n| Value::from(*n)))
    }

    #[test]
    fn search_finds_raw_and_wrapped_elements() {
        let element = Target::object();
        let target = Target::from_values([Value::from(1), Value::from(&element)]);
        let list = reactive(&target);

        assert!(list.includes(&Value::from(&element)));
        let wrapped = list.get(1usize);
        assert!(wrapped.as_view().is_some());
        assert!(list.includes(&wrapped));
        assert_eq!(list.index_of(&wrapped), Some(1));
        assert_eq!(list.index_of(&Value::from(2)), None);
    }

    #[test]
    fn includes_matches_nan_but_index_of_does_not() {
        let list = reactive(&Target::from_values([Value::from(f64::NAN)]));
        assert!(list.includes(&Value::from(f64::NAN)));
        assert_eq!(list.index_of(&Value::from(f64::NAN)), None);
    }

    #[test]
    fn last_index_of_searches_backwards() {
        let list = reactive(&numbers(&[1, 2, 1]));
        assert_eq!(list.last_index_of(&Value::from(1)), Some(2));
    }

    #[test]
    fn mutators_edit_the_array() {
        let target = numbers(&[1, 2, 3]);
        let list = reactive(&target);

        assert_eq!(list.push(4), Some(4));
        assert_eq!(list.pop(), Some(Value::from(4)));
        assert_eq!(list.shift(), Some(Value::from(1)));
        assert_eq!(list.unshift(0), Some(3));
        assert_eq!(
            list.splice(1, 1, [Value::from(7), Value::from(8)]),
            Some(vec![Value::from(2)])
        );
        assert_eq!(target.to_json(), serde_json::json!([0, 7, 8, 3]));
    }

    #[test]
    fn readonly_mutators_are_rejected() {
        let target = numbers(&[1]);
        let list = readonly(&target);
        assert_eq!(list.push(2), None);
        assert_eq!(list.pop(), None);
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn search_tracks_every_index() {
        let target = numbers(&[1, 2]);
        let list = reactive(&target);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let l = list.clone();
        let _effect = effect(
            move || {
                l.includes(&Value::from(5));
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );

        list.set(1usize, 5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        list.push(9);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn push_notifies_only_the_new_index_and_length() {
        let list = reactive(&numbers(&[1, 2]));
        let first_runs = Arc::new(AtomicI32::new(0));
        let length_runs = Arc::new(AtomicI32::new(0));

        let l = list.clone();
        let runs = first_runs.clone();
        let _first = effect(
            move || {
                l.get(0usize);
                runs.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );
        let l = list.clone();
        let runs = length_runs.clone();
        let _length = effect(
            move || {
                l.get("length");
                runs.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );

        for n in 0..100 {
            list.push(n);
        }
        assert_eq!(list.target().len(), 102);
        assert_eq!(first_runs.load(Ordering::SeqCst), 1);
        assert_eq!(length_runs.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn pop_notifies_readers_of_the_removed_index() {
        let list = reactive(&numbers(&[1, 2, 3]));
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let l = list.clone();
        let _effect = effect(
            move || {
                l.get(2usize);
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );

        assert_eq!(list.pop(), Some(Value::from(3)));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        list.pop();
        list.pop();
        let settled = runs.load(Ordering::SeqCst);

        // Nothing left to remove, nothing announced.
        assert_eq!(list.pop(), None);
        assert_eq!(runs.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn pop_notifies_length_readers() {
        let list = reactive(&numbers(&[1, 2, 3]));
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let l = list.clone();
        let _effect = effect(
            move || {
                l.get("length");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );

        list.pop();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
