use std::fs;
use std::path::Path;
use std::time::Duration;

use kiln_lib::Pipeline;
use kiln_lib::config::Config;
use kiln_lib::coordinator::StartMode;
use kiln_lib::driver::WatchOptions;
use tempfile::TempDir;
use tokio::task::LocalSet;

fn project(dir: &Path, output: &str) -> Config {
  fs::create_dir_all(dir.join("src/beta")).unwrap();
  fs::write(dir.join("src/alpha.lua"), "return { version = 1 }").unwrap();
  fs::write(dir.join("src/beta/init.lua"), "exports.name = 'beta'").unwrap();
  let path = dir.join("kiln.yaml");
  fs::write(
    &path,
    format!("entries:\n  alpha: src/alpha\n  beta: src/beta\noutput:\n{output}"),
  )
  .unwrap();
  Config::load(&path).unwrap()
}

#[tokio::test]
async fn disk_pipeline_builds_and_rebuilds() {
  let temp = TempDir::new().unwrap();
  let config = project(temp.path(), "  dir: target\n");

  LocalSet::new()
    .run_until(async {
      let pipeline = Pipeline::start(&config, StartMode::Once).unwrap();

      let alpha = pipeline.resolve("alpha").await.unwrap();
      assert_eq!(alpha.get::<i64>("version").unwrap(), 1);
      assert!(temp.path().join("target/alpha.lua").is_file());
      assert!(temp.path().join("target/beta.lua").is_file());

      fs::write(temp.path().join("src/alpha.lua"), "return { version = 2 }").unwrap();
      pipeline.coordinator().request_rebuild();

      let alpha = pipeline.resolve("alpha").await.unwrap();
      assert_eq!(alpha.get::<i64>("version").unwrap(), 2);
      let status = pipeline.coordinator().status().await.unwrap();
      assert_eq!(status.builds_issued, 2);

      pipeline.shutdown().await;
    })
    .await;
}

#[tokio::test]
async fn watch_pipeline_picks_up_changes() {
  let temp = TempDir::new().unwrap();
  let mut config = project(temp.path(), "  dir: target\n  mode: combined\n  store: memory\n");
  config.watch.debounce_ms = 20;

  LocalSet::new()
    .run_until(async {
      let pipeline = Pipeline::start(&config, StartMode::Watch(config.watch.options())).unwrap();
      let timeout = Duration::from_secs(10);

      let beta = pipeline.resolver().resolve_timeout("beta", timeout).await.unwrap();
      assert_eq!(beta.get::<String>("name").unwrap(), "beta");

      fs::write(temp.path().join("src/alpha.lua"), "return { version = 2 }").unwrap();

      let mut version = 1;
      for _ in 0..100 {
        let alpha = pipeline.resolver().resolve_timeout("alpha", timeout).await.unwrap();
        version = alpha.get::<i64>("version").unwrap();
        if version == 2 {
          break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
      }
      assert_eq!(version, 2);

      pipeline.shutdown().await;
    })
    .await;
}

#[test]
fn watch_options_come_from_config() {
  let temp = TempDir::new().unwrap();
  let config = project(temp.path(), "  dir: target\n");
  assert_eq!(
    config.watch.options(),
    WatchOptions {
      debounce: Duration::from_millis(100)
    }
  );
}
