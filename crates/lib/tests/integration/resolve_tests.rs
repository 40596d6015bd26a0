use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use kiln_lib::ResolveError;
use kiln_lib::config::OutputMode;
use kiln_lib::coordinator::{BuildStats, FailurePolicy, StartMode};
use kiln_lib::loader::LoadError;
use tokio::task::LocalSet;

use super::common::Harness;

#[tokio::test]
async fn timeout_abandons_the_wait() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);

      let err = h
        .resolver
        .resolve_timeout("alpha", Duration::from_millis(20))
        .await
        .unwrap_err();
      assert!(matches!(err, ResolveError::Timeout { ref name, .. } if name == "alpha"));

      // The abandoned waiter is pruned when the next caller queues.
      let waiter = {
        let resolver = h.resolver.clone();
        tokio::task::spawn_local(async move { resolver.resolve("alpha").await.map(|_| ()) })
      };
      assert_eq!(h.quiesce().await.pending, 1);

      h.emit("alpha.lua", "return {}");
      h.sink.done(BuildStats::default());
      waiter.await.unwrap().unwrap();
    })
    .await;
}

#[tokio::test]
async fn timeout_not_hit_when_build_is_valid() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      h.emit("alpha.lua", "return { ok = true }");
      h.sink.done(BuildStats::default());

      let artifact = h
        .resolver
        .resolve_timeout("alpha", Duration::from_secs(5))
        .await
        .unwrap();
      assert!(artifact.get::<bool>("ok").unwrap());
    })
    .await;
}

#[tokio::test]
async fn missing_output_is_a_read_error() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      h.sink.done(BuildStats::default());

      let err = h.resolver.resolve("alpha").await.unwrap_err();

      match err {
        ResolveError::ArtifactRead { path, source } => {
          assert_eq!(path, std::path::PathBuf::from("/target/alpha.lua"));
          assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected read error, got {:?}", other),
      }
    })
    .await;
}

#[tokio::test]
async fn broken_output_is_a_load_error() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha", "beta"], FailurePolicy::Stall);
      h.emit("alpha.lua", "return {");
      h.emit("beta.lua", "error('exploded')");
      h.sink.done(BuildStats::default());

      let err = h.resolver.resolve("alpha").await.unwrap_err();
      assert!(matches!(err, ResolveError::Load(LoadError::Syntax { .. })), "got {:?}", err);

      let err = h.resolver.resolve("beta").await.unwrap_err();
      match err {
        ResolveError::Load(LoadError::Runtime { filename, message }) => {
          assert_eq!(filename, std::path::PathBuf::from("/src/beta.lua"));
          assert!(message.contains("exploded"));
        }
        other => panic!("expected runtime error, got {:?}", other),
      }
    })
    .await;
}

#[tokio::test]
async fn combined_output_without_entry_export() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Combined, &["alpha", "beta"], FailurePolicy::Stall);
      h.emit("bundle.lua", "return { alpha = {} }");
      h.sink.done(BuildStats::default());

      let err = h.resolver.resolve("beta").await.unwrap_err();
      assert!(matches!(err, ResolveError::MissingExport { ref name, .. } if name == "beta"));
    })
    .await;
}

#[tokio::test]
async fn reject_policy_surfaces_build_failure() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Reject);
      h.coordinator.start(StartMode::Once);
      let waiter = {
        let resolver = h.resolver.clone();
        tokio::task::spawn_local(async move { resolver.resolve("alpha").await.map(|_| ()) })
      };
      assert_eq!(h.quiesce().await.pending, 1);

      h.sink.done(BuildStats::failed("alpha: unexpected symbol"));

      match waiter.await.unwrap() {
        Err(ResolveError::BuildFailed(failure)) => {
          assert_eq!(failure.errors, vec!["alpha: unexpected symbol".to_string()])
        }
        other => panic!("expected build failure, got {:?}", other.map(|_| ())),
      }

      // Callers arriving before the next build are rejected right away.
      assert!(matches!(
        h.resolver.resolve("alpha").await,
        Err(ResolveError::BuildFailed(_))
      ));
    })
    .await;
}

#[tokio::test]
async fn stall_policy_waits_for_a_good_build() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      h.coordinator.start(StartMode::Once);
      let waiter = {
        let resolver = h.resolver.clone();
        tokio::task::spawn_local(async move { resolver.resolve("alpha").await.map(|_| ()) })
      };
      h.sink.done(BuildStats::failed("boom"));
      assert_eq!(h.quiesce().await.pending, 1);
      assert!(!waiter.is_finished());

      h.coordinator.request_rebuild();
      assert_eq!(h.quiesce().await.builds_issued, 2);
      h.emit("alpha.lua", "return {}");
      h.sink.done(BuildStats::default());

      waiter.await.unwrap().unwrap();
      assert_eq!(h.driver.runs.get(), 2);
    })
    .await;
}

#[tokio::test]
async fn when_ready_callback_fires_after_build() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      let fired = Rc::new(Cell::new(0));
      {
        let fired = fired.clone();
        h.resolver.resolve_when_ready(move || fired.set(fired.get() + 1));
      }
      assert_eq!(h.quiesce().await.pending, 1);

      h.sink.done(BuildStats::default());
      h.quiesce().await;

      assert_eq!(fired.get(), 1);
    })
    .await;
}

#[tokio::test]
async fn output_path_is_only_known_for_entries() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      assert_eq!(
        h.resolver.output_path("alpha"),
        Some(std::path::PathBuf::from("/target/alpha.lua"))
      );
      assert_eq!(h.resolver.output_path("gamma"), None);
      assert_eq!(h.resolver.entries().len(), 1);
    })
    .await;
}

#[tokio::test]
async fn watch_mode_resolves_after_first_build() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      h.coordinator.start(StartMode::Watch(Default::default()));

      let status = h.quiesce().await;
      assert_eq!(h.driver.watches.get(), 1);
      assert_eq!(h.driver.runs.get(), 0);
      assert!(status.building);

      h.emit("alpha.lua", "return { watched = true }");
      h.sink.done(BuildStats::default());
      let artifact = h.resolver.resolve("alpha").await.unwrap();
      assert!(artifact.get::<bool>("watched").unwrap());
    })
    .await;
}
