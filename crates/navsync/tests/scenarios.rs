//! End-to-end synchronization scenarios against the in-memory backend.
//!
//! Each module drives a [`SyncedHistory`] through one family of behaviour
//! and asserts on the backend log, the location, the parameter view, and
//! the engine counters.

use std::cell::RefCell;
use std::rc::Rc;

use navsync::prelude::*;
use navsync::{MemoryHistoryConfig, SyncStats};
use navsync_backend::listener;
use navsync_core::normalize::query_body;
use navsync_core::normalize_affixed;
use pretty_assertions::assert_eq;
use serde_json::json;

// ===========================================================================
// Helpers
// ===========================================================================

fn history_at(href: &str) -> SyncedHistory<MemoryHistory> {
    history_with(href, SyncConfig::default())
}

fn history_with(href: &str, config: SyncConfig) -> SyncedHistory<MemoryHistory> {
    let (path, query) = href.split_once('?').unwrap_or((href, ""));
    let entry = Entry::new(path).with_query(normalize_affixed(query, '?'));
    let backend = MemoryHistory::with_entries(vec![entry], 0, MemoryHistoryConfig::unlimited());
    SyncedHistory::with_config(backend, config).unwrap()
}

/// Record every query the backend reports to its listeners.
fn record_queries(history: &SyncedHistory<MemoryHistory>) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = Rc::clone(&seen);
    history.subscribe(listener(move |entry, _| {
        seen_clone.borrow_mut().push(entry.query.clone());
        Ok(())
    }));
    seen
}

fn backend_writes(history: &SyncedHistory<MemoryHistory>) -> u64 {
    let stats = history.stats();
    let backend = MemoryHistory::stats(history);
    assert_eq!(stats.backend_writes(), backend.pushes + backend.replaces);
    backend.pushes + backend.replaces
}

// ===========================================================================
// Idempotence
// ===========================================================================

mod idempotence {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_prefix_query_on_empty_query_does_nothing() {
        let history = history_at("/a");
        assert!(!history.location().set_query("?").unwrap());
        assert_eq!(backend_writes(&history), 0);
        assert_eq!(history.stats(), SyncStats::default());
    }

    #[test]
    fn same_path_write_is_dropped() {
        let history = history_at("/a");
        assert!(!history.location().set_path(" /a ").unwrap());
        assert_eq!(backend_writes(&history), 0);
    }

    #[test]
    fn identical_assignment_is_dropped() {
        let history = history_at("/a?x=1");
        assert!(!history.set_location("/a?x=1").unwrap());
        assert!(!history.set_location("/a?x=1#").unwrap());
        assert_eq!(backend_writes(&history), 0);
    }

    #[test]
    fn no_op_parameter_mutations_do_not_navigate() {
        let history = history_at("/a?x=1");
        let params = history.search_params().unwrap();
        assert!(!params.delete("missing").unwrap());
        assert!(!params.set("x", "1").unwrap());
        assert!(!params.sort().unwrap());
        assert_eq!(backend_writes(&history), 0);
    }
}

// ===========================================================================
// Loop bounds
// ===========================================================================

mod loop_bound {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn path_write_pushes_once() {
        let history = history_at("/a");
        history.location().set_path("/b").unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert!(history.stats().reactions <= 3);
    }

    #[test]
    fn parameter_write_pushes_once() {
        let history = history_at("/a");
        history.search_params().unwrap().append("x", "1").unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert!(history.stats().reactions <= 3, "{:?}", history.stats());
    }

    #[test]
    fn assignment_of_every_field_pushes_once() {
        let history = history_at("/a?x=1");
        history
            .set_location(
                LocationParts::new()
                    .path("/b")
                    .query("y=2")
                    .fragment("f")
                    .state(json!({"n": 1})),
            )
            .unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert!(history.stats().reactions <= 3, "{:?}", history.stats());
        assert_eq!(history.current_entry().href(), "/b?y=2#f");
        assert_eq!(history.current_entry().state, json!({"n": 1}));
    }

    #[test]
    fn external_pop_changes_everything_without_navigating() {
        let history = history_at("/a");
        history
            .push(Entry::new("/b").with_query("?q=1").with_fragment("#f").with_state(json!(7)))
            .unwrap();
        let before = history.stats();
        history.go_back().unwrap();
        let after = history.stats();
        assert_eq!(after.backend_writes(), before.backend_writes());
        assert!(after.reactions - before.reactions <= 3, "{after:?}");
        assert_eq!(history.location().href(), "/a");
        assert_eq!(history.location().state(), serde_json::Value::Null);
    }

    #[test]
    fn batched_writes_coalesce_into_one_push() {
        let history = history_at("/a");
        history
            .location()
            .batch(|loc| {
                loc.set_path("/b")?;
                loc.set_query("x=1")?;
                loc.set_fragment("top")
            })
            .unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert_eq!(history.current_entry().href(), "/b?x=1#top");
    }

    #[test]
    fn batched_parameter_writes_coalesce() {
        let history = history_at("/a");
        let params = history.search_params().unwrap();
        navsync_reactive::run_atomically(|| {
            params.set("a", "1")?;
            params.set("b", "2")?;
            params.delete("a")
        })
        .unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert_eq!(history.current_entry().query, "?b=2");
    }

    #[test]
    fn field_and_parameter_writes_in_one_batch_push_once() {
        let history = history_at("/a");
        let params = history.search_params().unwrap();
        history
            .location()
            .batch(|loc| {
                loc.set_path("/b")?;
                params.set("x", "1")
            })
            .unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert_eq!(history.entry_count(), 2);
        assert_eq!(history.current_entry().href(), "/b?x=1");
        assert_eq!(history.stats().params_rebuilds, 0);
        assert!(params.is_observable());
    }

    #[test]
    fn parameter_write_before_field_write_in_one_batch_pushes_once() {
        let history = history_at("/a?x=1");
        let params = history.search_params().unwrap();
        history
            .location()
            .batch(|loc| {
                params.append("x", "2")?;
                loc.set_fragment("top")
            })
            .unwrap();
        assert_eq!(backend_writes(&history), 1);
        assert_eq!(history.current_entry().href(), "/a?x=1,2#top");
    }
}

// ===========================================================================
// Scenarios
// ===========================================================================

mod scenario_a_path_write {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn path_write_keeps_query() {
        let history = history_at("/a?x=1");
        let queries = record_queries(&history);
        history.location().set_path("/b").unwrap();
        assert_eq!(history.current_entry().href(), "/b?x=1");
        assert_eq!(history.location().path(), "/b");
        assert_eq!(*queries.borrow(), vec!["?x=1".to_owned()]);
        assert_eq!(history.action(), Action::Push);
    }
}

mod scenario_b_repeated_values {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_append_set_progression() {
        let history = history_with("/", SyncConfig::default().with_join_arrays(false));
        let queries = record_queries(&history);
        let params = history.search_params().unwrap();

        params.append("x", "1").unwrap();
        assert_eq!(params.to_string(), "x=1");
        params.append("x", "2").unwrap();
        assert_eq!(params.to_string(), "x=1&x=2");
        params.set("x", "3").unwrap();
        assert_eq!(params.to_string(), "x=3");

        assert_eq!(*queries.borrow(), vec!["?x=1", "?x=1&x=2", "?x=3"]);
        assert_eq!(history.entry_count(), 4);
    }

    #[test]
    fn joined_values_by_default() {
        let history = history_at("/");
        let params = history.search_params().unwrap();
        params.append("x", "1").unwrap();
        params.append("x", "2").unwrap();
        assert_eq!(history.current_entry().query, "?x=1,2");
        assert_eq!(params.get_all("x"), vec!["1", "2"]);
    }
}

mod scenario_c_query_write {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn repeated_query_write_navigates_once() {
        let history = history_at("/");
        assert!(history.location().set_query("test").unwrap());
        assert!(!history.location().set_query("test").unwrap());
        assert_eq!(backend_writes(&history), 1);
        assert_eq!(history.current_entry().query, "?test");
    }
}

mod scenario_d_merge {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_with_replace_keeps_entry_count() {
        let history = history_at("/a");
        history.merge("/path?x=1", true).unwrap();
        assert_eq!(history.entry_count(), 1);
        assert_eq!(history.location().href(), "/path?x=1");
        assert_eq!(history.action(), Action::Replace);
    }

    #[test]
    fn merge_without_replace_grows_by_one_per_call() {
        let history = history_at("/a");
        history.merge("/path?x=1", false).unwrap();
        assert_eq!(history.entry_count(), 2);
        history.merge("/path?x=1", false).unwrap();
        assert_eq!(history.entry_count(), 3);
    }

    #[test]
    fn merge_keeps_fields_the_partial_leaves_out() {
        let history = history_at("/a?x=1");
        history.location().set_state(json!({"keep": true})).unwrap();
        history.merge(LocationParts::new().fragment("f").query(""), false).unwrap();
        assert_eq!(history.location().href(), "/a?x=1#f");
        assert_eq!(history.location().state(), json!({"keep": true}));
    }
}

mod scenario_e_destroy {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stray_handles_leave_the_backend_alone() {
        let mut history = history_at("/a?x=1");
        let location = history.location();
        let params = history.search_params().unwrap();

        let backend = history.destroy();
        location.set_path("/elsewhere").unwrap();
        params.set("x", "2").unwrap();

        assert_eq!(backend.entry_count(), 1);
        assert_eq!(backend.current_entry().href(), "/a?x=1");
        assert!(history.search_params().is_none());
        assert!(!location.is_observable());
        assert!(!params.is_observable());
    }

    #[test]
    fn backend_events_after_destroy_do_not_propagate() {
        let mut history = history_at("/a");
        let location = history.location();
        let backend = history.destroy();
        backend.push(Entry::new("/later")).unwrap();
        assert_eq!(location.path(), "/a");
        assert_eq!(history.location().path(), "/later", "snapshot reads the backend");
        assert!(!history.location().is_observable());
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut history = history_at("/a");
        let first = history.destroy();
        let second = history.destroy();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(history.merge("/x", false).is_ok());
        assert_eq!(first.entry_count(), 1);
    }
}

// ===========================================================================
// Backend-originated changes
// ===========================================================================

mod backend_events {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pop_updates_location_params_and_action() {
        let history = history_at("/a?x=1");
        history.search_params().unwrap().set("x", "2").unwrap();
        history.go_back().unwrap();

        assert_eq!(history.location().query(), "?x=1");
        assert_eq!(history.search_params().unwrap().get("x").as_deref(), Some("1"));
        assert_eq!(history.action(), Action::Pop);
        assert_eq!(history.entry_count(), 2);
    }

    #[test]
    fn external_replace_rebuilds_params() {
        let history = history_at("/a?x=1");
        let old = history.search_params().unwrap();
        history.replace(Entry::new("/a").with_query("y=2")).unwrap();
        assert!(!old.is_observable());
        assert_eq!(history.search_params().unwrap().to_string(), "y=2");
        assert_eq!(history.location().query(), "?y=2");
        assert_eq!(history.action(), Action::Replace);
        assert_eq!(history.stats().params_rebuilds, 1);
    }

    #[test]
    fn action_observable_reports_traversal() {
        let history = history_at("/a");
        let actions = Rc::new(RefCell::new(Vec::new()));
        let actions_clone = Rc::clone(&actions);
        let _sub = history
            .engine()
            .unwrap()
            .action_observable()
            .subscribe(move |action| actions_clone.borrow_mut().push(*action));

        history.location().set_path("/b").unwrap();
        history.go_back().unwrap();
        history.go_forward().unwrap();
        assert_eq!(*actions.borrow(), vec![Action::Push, Action::Pop]);
        assert_eq!(history.location().path(), "/b");
    }

    #[test]
    fn malformed_entry_is_reported_and_not_applied() {
        let history = history_at("/a");
        let err = history.push(Entry::new("/bad?path")).unwrap_err();
        let err = SyncError::from(err);
        assert_eq!(err.error_type(), "malformed_input");
        assert_eq!(history.location().href(), "/a");
    }
}

// ===========================================================================
// Facade writes
// ===========================================================================

mod facade_writes {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_search_params_from_string() {
        let history = history_at("/a?x=1");
        assert!(history.set_search_params("?q=rust").unwrap());
        assert_eq!(history.current_entry().href(), "/a?q=rust");
        assert_eq!(history.search_params().unwrap().get("q").as_deref(), Some("rust"));
    }

    #[test]
    fn set_search_params_from_pairs() {
        let history = history_at("/a");
        history
            .set_search_params(vec![("page", ParamValue::from("2")), ("empty", ParamValue::Absent)])
            .unwrap();
        assert_eq!(history.current_entry().query, "?page=2");
    }

    #[test]
    fn assignment_from_string_clears_missing_fields() {
        let history = history_at("/a?x=1");
        history.location().set_fragment("top").unwrap();
        history.set_location("/b").unwrap();
        assert_eq!(history.current_entry().href(), "/b");
        assert_eq!(history.entry_count(), 3);
    }

    #[test]
    fn state_only_write_navigates() {
        let history = history_at("/a");
        history.location().set_state(json!({"scroll": 120})).unwrap();
        assert_eq!(history.entry_count(), 2);
        assert_eq!(history.current_entry().state, json!({"scroll": 120}));
    }
}

// ===========================================================================
// Errors
// ===========================================================================

mod errors {
    use super::*;
    use pretty_assertions::assert_eq;
    use navsync_reactive::ReactionError;

    #[test]
    fn malformed_assignment_surfaces_to_caller() {
        let history = history_at("/a");
        let err = history.set_location("https://example.test/a").unwrap_err();
        assert!(err.is_malformed_input());
        assert_eq!(backend_writes(&history), 0);
    }

    #[test]
    fn raw_encoded_fragment_delimiter_is_rejected() {
        let history = history_with("/a", SyncConfig::default().with_encoder(Encoder::Raw));
        let err = history.search_params().unwrap().set("q", "a#b").unwrap_err();
        assert!(err.is_malformed_input());
        assert_eq!(history.current_entry().query, "");

        let params = history.search_params().unwrap();
        let location = history.location();
        assert_eq!(params.to_string(), query_body(&location.query()));
        assert!(!params.has("q"));
        assert_eq!(backend_writes(&history), 0);
    }

    #[test]
    fn raw_encoded_padding_keeps_the_view_live() {
        let history = history_with("/a", SyncConfig::default().with_encoder(Encoder::Raw));
        let params = history.search_params().unwrap();
        assert!(params.set("a", "x ").unwrap());
        assert_eq!(history.current_entry().query, "?a=x");
        assert_eq!(params.to_string(), "a=x");
        assert_eq!(history.stats().params_rebuilds, 0);
        assert!(params.is_observable());

        params.set("b", "1").unwrap();
        assert_eq!(history.current_entry().query, "?a=x &b=1");
        assert_eq!(params.to_string(), "a=x &b=1");
        assert_eq!(backend_writes(&history), 2);
    }

    #[test]
    fn failing_application_reaction_reaches_the_writer() {
        let history = history_at("/a");
        let location = history.location();
        let _sub = location
            .path_observable()
            .react(|_| Err(ReactionError::msg("view refused")));
        let err = location.set_path("/b").unwrap_err();
        assert_eq!(err.error_type(), "reaction");
        assert_eq!(err.to_string(), "reaction failed: view refused");
        assert_eq!(history.current_entry().path, "/b", "the push itself went through");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = SyncedHistory::with_config(
            MemoryHistory::default(),
            SyncConfig::default().with_join_arrays_with("="),
        )
        .unwrap_err();
        assert_eq!(err.error_type(), "config");
    }
}
