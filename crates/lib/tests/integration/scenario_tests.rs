use std::cell::RefCell;
use std::rc::Rc;

use kiln_lib::ResolveError;
use kiln_lib::config::OutputMode;
use kiln_lib::coordinator::{BuildState, BuildStats, FailurePolicy};
use mlua::prelude::*;
use tokio::task::LocalSet;

use super::common::Harness;

#[tokio::test]
async fn single_mode_resolves_whole_exports() -> LuaResult<()> {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);
      h.emit(
        "alpha.lua",
        "exports.handler = function(x) return x * 2 end\nexports.kind = 'handler'",
      );
      h.sink.done(BuildStats::default());

      let artifact = h.resolver.resolve("alpha").await.unwrap();

      assert_eq!(artifact.call::<i64>("handler", 21)?, 42);
      assert_eq!(artifact.get::<String>("kind")?, "handler");
      assert_eq!(artifact.describe()?.len(), 2);
      assert_eq!(artifact.filename(), std::path::Path::new("/src/alpha.lua"));
      Ok::<(), LuaError>(())
    })
    .await
}

#[tokio::test]
async fn combined_mode_resolves_named_export() -> LuaResult<()> {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Combined, &["alpha", "beta"], FailurePolicy::Stall);
      h.emit(
        "bundle.lua",
        "return { alpha = function() return 'a' end, beta = function() return 'b' end }",
      );
      h.sink.done(BuildStats::default());

      let alpha = h.resolver.resolve("alpha").await.unwrap();

      let function = alpha.function().expect("alpha export should be a function");
      assert_eq!(function.call::<String>(())?, "a");
      assert!(alpha.table().is_none());
      Ok::<(), LuaError>(())
    })
    .await
}

#[tokio::test]
async fn unknown_artifact_never_touches_coordinator() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha"], FailurePolicy::Stall);

      let err = h.resolver.resolve("gamma").await.unwrap_err();

      assert!(matches!(err, ResolveError::UnknownArtifact(ref name) if name == "gamma"));
      let status = h.quiesce().await;
      assert_eq!(status.state, BuildState::Invalid);
      assert_eq!(status.pending, 0);
      assert_eq!(status.builds_issued, 0);
      assert_eq!(h.driver.runs.get(), 0);
    })
    .await;
}

#[tokio::test]
async fn callers_queued_while_invalid_resolve_in_call_order() {
  LocalSet::new()
    .run_until(async {
      let h = Harness::new(OutputMode::Single, &["alpha", "beta"], FailurePolicy::Stall);
      let order = Rc::new(RefCell::new(Vec::new()));

      let mut tasks = Vec::new();
      for (call, name) in ["alpha", "beta", "alpha"].into_iter().enumerate() {
        let resolver = h.resolver.clone();
        let order = order.clone();
        tasks.push(tokio::task::spawn_local(async move {
          let artifact = resolver.resolve(name).await.unwrap();
          order.borrow_mut().push(call);
          artifact.get::<String>("id").unwrap()
        }));
      }
      assert_eq!(h.quiesce().await.pending, 3);
      assert!(order.borrow().is_empty());

      h.emit("alpha.lua", "return { id = 'alpha' }");
      h.emit("beta.lua", "return { id = 'beta' }");
      h.sink.build_starting();
      h.sink.done(BuildStats::default());

      let mut ids = Vec::new();
      for task in tasks {
        ids.push(task.await.unwrap());
      }

      assert_eq!(ids, vec!["alpha", "beta", "alpha"]);
      assert_eq!(*order.borrow(), vec![0, 1, 2]);
      assert_eq!(h.quiesce().await.pending, 0);
    })
    .await;
}
