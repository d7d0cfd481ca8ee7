//! End-to-end pipeline service tests against mocked infrastructure.

use wimforge_cli::application::services::pipeline::run_build;
use wimforge_cli::domain::workspace::{RunStage, validate_instance_id};

use crate::helpers::{BuildFixture, job_all_ok, job_inject_fails};
use crate::mocks::{InlinePool, MemoryStateStore, MockAllocator, MockImages, MockIso, MockPackages, RecordingReporter};

#[tokio::test]
async fn successful_build_walks_every_stage() {
    let images = MockImages::default();
    let packages = MockPackages {
        cache_hit: true,
        ..MockPackages::default()
    };
    let iso = MockIso::default();
    let allocator = MockAllocator::rooted_at("/tmp/wf");
    let states = MemoryStateStore::default();
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    let outcome = run_build(
        &images,
        &packages,
        &iso,
        &allocator,
        &InlinePool,
        &states,
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect("build succeeds");

    validate_instance_id(&outcome.run_id).expect("run id is a uuid");
    assert_eq!(outcome.output_path, fixture.output);
    assert!(outcome.iso.signature_ok);

    assert_eq!(
        states.stages(),
        vec![
            "Init",
            "PackageResolved",
            "Mounted",
            "Customized",
            "Dismounted",
            "Assembled"
        ]
    );
    // Final cleanup drops the state and the workspace directories.
    assert!(states.get(&outcome.run_id).is_none());
    assert_eq!(allocator.removed_ids(), vec![outcome.run_id.clone()]);

    let calls = images.calls();
    assert!(calls.contains(&"mount index 1".to_string()));
    assert!(calls.contains(&"dismount commit".to_string()));
    assert!(!calls.contains(&"dismount discard".to_string()));
}

#[tokio::test]
async fn cache_hit_skips_the_download() {
    let packages = MockPackages {
        cache_hit: true,
        ..MockPackages::default()
    };
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    run_build(
        &MockImages::default(),
        &packages,
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect("build succeeds");

    assert_eq!(packages.fetch_count(), 0);
    assert!(reporter.contains("using cached"));
}

#[tokio::test]
async fn cache_miss_downloads_once() {
    let packages = MockPackages::default();
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    run_build(
        &MockImages::default(),
        &packages,
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect("build succeeds");

    assert_eq!(packages.fetch_count(), 1);
    assert!(reporter.contains("downloaded and verified"));
}

#[tokio::test]
async fn transient_download_failure_consumes_all_retries() {
    let packages = MockPackages {
        fail_fetch: true,
        ..MockPackages::default()
    };
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    let err = run_build(
        &MockImages::default(),
        &packages,
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect_err("download keeps failing");

    // Initial try plus the fixture's two retries.
    assert_eq!(packages.fetch_count(), 3);
    assert!(format!("{err:#}").contains("downloading runtime package"));
}

#[tokio::test]
async fn mount_failure_records_failed_state_and_cleans_up() {
    let images = MockImages {
        fail_mount: true,
        ..MockImages::default()
    };
    let states = MemoryStateStore::default();
    let allocator = MockAllocator::rooted_at("/tmp/wf");
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    let err = run_build(
        &images,
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &MockIso::default(),
        &allocator,
        &InlinePool,
        &states,
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect_err("mount fails");
    assert!(format!("{err:#}").contains("mounting image"));

    // The mount never held, so no discard; the workspace still goes away.
    assert!(!images.calls().contains(&"dismount discard".to_string()));
    assert_eq!(allocator.removed_ids().len(), 1);

    let run_id = &allocator.removed_ids()[0];
    let state = states.get(run_id).expect("failure state kept");
    assert_eq!(state.stage, RunStage::Failed);
    assert!(state.failure.expect("failure message").contains("mount"));
}

#[tokio::test]
async fn commit_failure_discards_the_mount() {
    let images = MockImages {
        fail_commit: true,
        ..MockImages::default()
    };
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    run_build(
        &images,
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect_err("commit fails");

    let calls = images.calls();
    assert!(calls.contains(&"dismount commit".to_string()));
    assert!(
        calls.contains(&"dismount discard".to_string()),
        "failure path must release the mount, got: {calls:?}"
    );
}

#[tokio::test]
async fn job_failure_fails_the_build_and_discards() {
    let images = MockImages::default();
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    let err = run_build(
        &images,
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_inject_fails),
    )
    .await
    .expect_err("inject job failed");

    let msg = format!("{err:#}");
    assert!(msg.contains("inject-runtime"), "got: {msg}");
    assert!(msg.contains("hive load refused"), "got: {msg}");
    // No commit of a half-customized image.
    assert!(!images.calls().contains(&"dismount commit".to_string()));
    assert!(images.calls().contains(&"dismount discard".to_string()));
}

#[tokio::test]
async fn skip_cleanup_keeps_workspace_on_failure() {
    let allocator = MockAllocator::rooted_at("/tmp/wf");
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();
    let mut opts = fixture.options(&reporter, job_all_ok);
    opts.skip_cleanup = true;

    run_build(
        &MockImages {
            fail_mount: true,
            ..MockImages::default()
        },
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &MockIso::default(),
        &allocator,
        &InlinePool,
        &MemoryStateStore::default(),
        opts,
    )
    .await
    .expect_err("mount fails");

    assert!(allocator.removed_ids().is_empty());
    assert!(reporter.contains("kept for inspection"));
}

#[tokio::test]
async fn occupied_mount_point_is_a_precondition_failure() {
    let images = MockImages::already_mounted();
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();

    let err = run_build(
        &images,
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect_err("mount point occupied");

    assert!(format!("{err:#}").contains("already mounted"));
    assert!(!images.calls().iter().any(|c| c.starts_with("mount")));
}

#[tokio::test]
async fn explicit_instance_id_is_respected() {
    let id = "0a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9".to_string();
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture::default();
    let mut opts = fixture.options(&reporter, job_all_ok);
    opts.instance_id = Some(id.clone());

    let outcome = run_build(
        &MockImages::default(),
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &MockIso::default(),
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        opts,
    )
    .await
    .expect("build succeeds");

    assert_eq!(outcome.run_id, id);
}

#[tokio::test]
async fn volume_label_reaches_the_iso_builder() {
    let iso = MockIso::default();
    let reporter = RecordingReporter::default();
    let fixture = BuildFixture {
        label: "CUSTOM_PE".to_string(),
        ..BuildFixture::default()
    };

    run_build(
        &MockImages::default(),
        &MockPackages {
            cache_hit: true,
            ..MockPackages::default()
        },
        &iso,
        &MockAllocator::rooted_at("/tmp/wf"),
        &InlinePool,
        &MemoryStateStore::default(),
        fixture.options(&reporter, job_all_ok),
    )
    .await
    .expect("build succeeds");

    assert_eq!(
        iso.labels.lock().expect("labels lock").clone(),
        vec!["CUSTOM_PE".to_string()]
    );
}
