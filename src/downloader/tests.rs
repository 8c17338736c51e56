use super::test_helpers::{Script, ScriptedExtractor, create_test_downloader, create_test_downloader_with};
use crate::error::Error;
use crate::types::{Event, JobRequest, JobStatus, TaskState};
use std::sync::Arc;
use std::time::Duration;

const A: &str = "https://video.example/watch/a";
const B: &str = "https://video.example/watch/b";
const C: &str = "https://video.example/watch/c";

fn batch(urls: &[&str], format: &str) -> JobRequest {
    JobRequest {
        urls: urls.iter().map(|u| u.to_string()).collect(),
        format: format.into(),
        quality: "best".into(),
        audio_only: false,
        max_items: None,
    }
}

fn store_names(downloader: &super::MediaDownloader) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(&downloader.config.download.store_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn workspace_entries(downloader: &super::MediaDownloader) -> usize {
    std::fs::read_dir(&downloader.config.download.workspace_dir)
        .unwrap()
        .count()
}

#[tokio::test]
async fn bot_challenge_on_every_strategy_gives_partial_success() {
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(A, Script::produce("A [a].mp3", b"audio-a"))
            .on(B, Script::Fail("Sign in to confirm you're not a bot".into())),
    );
    let (downloader, _dir) = create_test_downloader(extractor.clone()).await;

    let mut request = batch(&[A, B], "mp3");
    request.audio_only = true;
    let result = downloader.execute(request).await.unwrap();

    assert_eq!(result.status, JobStatus::PartialSuccess);
    assert_eq!(result.outcomes.len(), 2);
    assert!(result.outcomes[0].succeeded());
    assert_eq!(result.outcomes[0].strategy, Some(0));
    assert_eq!(result.outcomes[1].error().unwrap().code, "bot_challenge");

    // four strategies, no executor retry for an exhausted challenge chain
    assert_eq!(extractor.calls(A), 1);
    assert_eq!(extractor.calls(B), 4);
    assert_eq!(result.outcomes[1].attempts, 1);

    // one successful file passes through unchanged
    let artifact = result.artifact.unwrap();
    assert_eq!(artifact.name, "A [a].mp3");
    assert_eq!(artifact.size_bytes, 7);
    assert!(artifact.expires_at > artifact.created_at);
    assert_eq!(workspace_entries(&downloader), 0);
}

#[tokio::test]
async fn outcomes_match_inputs_in_order() {
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(A, Script::Fail("Private video".into()))
            .on(B, Script::produce("b.mp4", b"b"))
            .on(C, Script::Fail("something nobody has seen before".into())),
    );
    let (downloader, _dir) = create_test_downloader(extractor.clone()).await;

    let result = downloader.execute(batch(&[A, B, C], "mp4")).await.unwrap();

    let urls: Vec<&str> = result.outcomes.iter().map(|o| o.url.as_str()).collect();
    assert_eq!(urls, vec![A, B, C]);
    assert_eq!(result.outcomes[0].error().unwrap().code, "upstream_unavailable");
    assert!(result.outcomes[1].succeeded());
    assert_eq!(result.outcomes[2].error().unwrap().code, "extractor_error");

    // fatal classes stop at the first strategy
    assert_eq!(extractor.calls(A), 1);
    assert_eq!(extractor.calls(C), 1);
}

#[tokio::test]
async fn two_files_are_archived_and_outcomes_point_at_the_archive() {
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(A, Script::produce("A.mp4", b"aaaa"))
            .on(B, Script::produce("B.mp4", b"bbbb")),
    );
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let result = downloader.execute(batch(&[A, B], "mp4")).await.unwrap();
    assert_eq!(result.status, JobStatus::Success);

    let artifact = result.artifact.unwrap();
    assert_eq!(store_names(&downloader), vec![format!("{}.zip", result.job_id)]);
    assert!(artifact.name.ends_with(".zip"));
    for outcome in &result.outcomes {
        assert_eq!(
            outcome.state,
            TaskState::Succeeded {
                path: artifact.path.clone()
            }
        );
    }
}

#[tokio::test]
async fn oversized_item_fails_alone_and_leaves_no_trace() {
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(A, Script::produce("huge.mp4", &[0u8; 64]))
            .on(B, Script::produce("small.mp4", b"abc")),
    );
    let (downloader, _dir) = create_test_downloader_with(extractor.clone(), |config| {
        config.download.max_artifact_bytes = 10;
    })
    .await;

    let result = downloader.execute(batch(&[A, B], "mp4")).await.unwrap();

    assert_eq!(result.status, JobStatus::PartialSuccess);
    assert_eq!(result.outcomes[0].error().unwrap().code, "size_exceeded");
    assert!(result.outcomes[1].succeeded());
    // not retried: the output would be just as large next time
    assert_eq!(extractor.calls(A), 1);

    let names = store_names(&downloader);
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("_small.mp4"), "{names:?}");
    assert_eq!(result.artifact.unwrap().name, "small.mp4");
    assert_eq!(workspace_entries(&downloader), 0);
}

#[tokio::test]
async fn bundle_over_the_limit_fails_every_item() {
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(A, Script::produce("A.mp4", b"aaaaaa"))
            .on(B, Script::produce("B.mp4", b"bbbbbb")),
    );
    let (downloader, _dir) = create_test_downloader_with(extractor, |config| {
        config.download.max_artifact_bytes = 10;
    })
    .await;
    let mut events = downloader.subscribe();

    let result = downloader.execute(batch(&[A, B], "mp4")).await.unwrap();

    assert_eq!(result.status, JobStatus::Failure);
    assert_eq!(result.error.as_ref().unwrap().code, "size_exceeded");
    assert!(result.artifact.is_none());
    for outcome in &result.outcomes {
        assert!(matches!(outcome.state, TaskState::Failed { .. }), "{outcome:?}");
        assert_eq!(outcome.error().unwrap().code, "size_exceeded");
    }
    assert!(store_names(&downloader).is_empty());

    let record = downloader.get_job(result.job_id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failure);

    let mut failed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::TaskFailed { .. }) {
            failed += 1;
        }
    }
    assert_eq!(failed, 2);
}

#[tokio::test]
async fn output_renamed_by_the_transcoder_is_still_promoted() {
    let extractor = Arc::new(ScriptedExtractor::new().on(
        A,
        Script::Moved {
            reported: "Song [a].webm".into(),
            name: "Song [a].mp3".into(),
            bytes: b"mp3".to_vec(),
        },
    ));
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let mut request = batch(&[A], "mp3");
    request.audio_only = true;
    let result = downloader.execute(request).await.unwrap();

    assert_eq!(result.status, JobStatus::Success);
    let artifact = result.artifact.unwrap();
    assert_eq!(artifact.name, "Song [a].mp3");
    assert_eq!(std::fs::read(&artifact.path).unwrap(), b"mp3");
    assert_eq!(workspace_entries(&downloader), 0);
}

#[tokio::test]
async fn transient_failure_is_retried_by_the_executor() {
    let extractor = Arc::new(ScriptedExtractor::new().on(
        A,
        Script::FailTimes {
            times: 1,
            message: "Connection reset by peer".into(),
            then: Box::new(Script::produce("a.mp4", b"a")),
        },
    ));
    let (downloader, _dir) = create_test_downloader(extractor.clone()).await;
    let mut events = downloader.subscribe();

    let result = downloader.execute(JobRequest::single(A)).await.unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.outcomes[0].attempts, 2);
    assert_eq!(extractor.calls(A), 2);

    let mut saw_retry = false;
    while let Ok(event) = events.try_recv() {
        if let Event::TaskRetrying { attempt, .. } = event {
            assert_eq!(attempt, 1);
            saw_retry = true;
        }
    }
    assert!(saw_retry);
}

#[tokio::test]
async fn task_timeout_is_retried_then_reported_without_leaking_workspaces() {
    let extractor = Arc::new(ScriptedExtractor::new().on(A, Script::Hang));
    let (downloader, _dir) = create_test_downloader_with(extractor.clone(), |config| {
        config.download.task_timeout = Duration::from_millis(100);
        config.retry.max_attempts = 1;
    })
    .await;

    let result = downloader.execute(JobRequest::single(A)).await.unwrap();

    assert_eq!(result.status, JobStatus::Failure);
    assert_eq!(result.outcomes[0].error().unwrap().code, "timeout");
    assert_eq!(result.outcomes[0].attempts, 2);
    assert_eq!(downloader.workspaces().acquired(), 2);
    assert_eq!(downloader.workspaces().outstanding(), 0);
    assert_eq!(workspace_entries(&downloader), 0);
    assert!(result.artifact.is_none());
}

#[tokio::test]
async fn job_timeout_reports_stragglers_as_failed() {
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(A, Script::produce("a.mp4", b"a"))
            .on(B, Script::Hang),
    );
    let (downloader, _dir) = create_test_downloader_with(extractor, |config| {
        config.download.job_timeout = Some(Duration::from_millis(300));
    })
    .await;

    let result = downloader.execute(batch(&[A, B], "mp4")).await.unwrap();

    assert_eq!(result.status, JobStatus::PartialSuccess);
    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.outcomes[1].error().unwrap().code, "timeout");
    assert_eq!(downloader.workspaces().outstanding(), 0);
    assert_eq!(workspace_entries(&downloader), 0);
}

#[tokio::test]
async fn playlist_expands_up_to_max_items() {
    let list = "https://video.example/playlist?list=PL1";
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .on(
                list,
                Script::Playlist(vec![
                    ("a".into(), A.into()),
                    ("b".into(), B.into()),
                    ("c".into(), C.into()),
                ]),
            )
            .on(A, Script::produce("a.mp3", b"a"))
            .on(B, Script::produce("b.mp3", b"b"))
            .on(C, Script::produce("c.mp3", b"c")),
    );
    let (downloader, _dir) = create_test_downloader(extractor.clone()).await;

    let mut request = batch(&[list], "mp3");
    request.max_items = Some(2);
    let result = downloader.execute(request).await.unwrap();

    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.outcomes[0].media_id.as_deref(), Some("a"));
    assert_eq!(result.outcomes[1].media_id.as_deref(), Some("b"));
    assert_eq!(extractor.calls(C), 0);
    assert_eq!(result.status, JobStatus::Success);
}

#[tokio::test]
async fn unresolvable_playlist_is_one_failed_outcome() {
    let list = "https://video.example/playlist?list=PL2";
    let extractor =
        Arc::new(ScriptedExtractor::new().on(list, Script::Fail("This playlist is unavailable".into())));
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let result = downloader.execute(batch(&[list], "mp4")).await.unwrap();

    assert_eq!(result.status, JobStatus::Failure);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].url, list);
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_task() {
    let extractor = Arc::new(ScriptedExtractor::new());
    let (downloader, _dir) = create_test_downloader(extractor.clone()).await;

    let bad = [
        batch(&["ftp://video.example/a"], "mp4"),
        batch(&[A], "avi"),
        JobRequest {
            quality: "ultra".into(),
            ..JobRequest::single(A)
        },
        JobRequest {
            max_items: Some(0),
            ..JobRequest::single(A)
        },
        batch(&[], "mp4"),
    ];
    for request in bad {
        assert!(matches!(
            downloader.execute(request).await,
            Err(Error::InvalidInput(_))
        ));
    }

    let too_many: Vec<String> = (0..30).map(|i| format!("https://video.example/{i}")).collect();
    let request = JobRequest {
        urls: too_many,
        ..JobRequest::single(A)
    };
    assert!(matches!(
        downloader.prepare_job(&request),
        Err(Error::InvalidInput(_))
    ));

    assert!(downloader.list_jobs().await.is_empty());
    assert_eq!(extractor.calls(A), 0);
}

#[tokio::test]
async fn submitted_job_reaches_a_terminal_state() {
    let extractor = Arc::new(ScriptedExtractor::new().on(A, Script::produce("a.mp4", b"a")));
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let id = downloader.submit(JobRequest::single(A)).await.unwrap();

    let record = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = downloader.get_job(id).await.unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(record.status, JobStatus::Success);
    assert!(record.result.unwrap().artifact.is_some());

    let stats = downloader.queue_stats().await;
    assert_eq!(stats.active_jobs, 0);
    assert_eq!(stats.store_items, 1);
    assert_eq!(stats.store_bytes, 1);
    assert_eq!(stats.max_concurrent_tasks, 3);
}

#[tokio::test]
async fn shutdown_stops_accepting_jobs() {
    let (downloader, _dir) = create_test_downloader(Arc::new(ScriptedExtractor::new())).await;

    downloader.shutdown().await.unwrap();

    assert!(!downloader.is_accepting());
    assert!(matches!(
        downloader.submit(JobRequest::single(A)).await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (downloader, _dir) = create_test_downloader(Arc::new(ScriptedExtractor::new())).await;
    assert!(matches!(
        downloader.get_job(crate::types::JobId::new()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn swept_artifacts_prune_their_job_records() {
    let extractor = Arc::new(ScriptedExtractor::new().on(A, Script::produce("a.mp4", b"a")));
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let result = downloader.execute(JobRequest::single(A)).await.unwrap();
    let artifact = result.artifact.unwrap();

    assert_eq!(downloader.prune_jobs(&[], chrono::Utc::now()).await, 0);
    assert_eq!(
        downloader
            .prune_jobs(std::slice::from_ref(&artifact.path), chrono::Utc::now())
            .await,
        1
    );
    assert!(downloader.list_jobs().await.is_empty());
}

#[tokio::test]
async fn info_lookup_survives_missing_thumbnail() {
    let extractor = Arc::new(ScriptedExtractor::new().on(A, Script::produce("a.mp4", b"a")));
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let info = downloader.get_info(A).await.unwrap();

    assert_eq!(info.id, "a");
    assert_eq!(info.title, format!("Title of {A}"));
    assert_eq!(info.view_count, Some(42));
    assert!(info.thumbnail.is_none());
}

#[tokio::test]
async fn capabilities_report_probed_sources() {
    let extractor = Arc::new(ScriptedExtractor::new());
    let (downloader, _dir) = create_test_downloader(extractor).await;

    let caps = downloader.capabilities().await;
    assert_eq!(caps.extractor, "scripted");
    assert_eq!(caps.credential_sources, vec!["browser:chrome".to_string()]);
    assert_eq!(caps.strategies, 4);
    assert_eq!(caps.formats.len(), 8);

    let reprobed = downloader.reprobe_credentials().await;
    assert_eq!(reprobed.strategies, 4);
}

#[tokio::test]
async fn credentialed_strategy_comes_first() {
    let extractor = Arc::new(ScriptedExtractor::new().on(
        A,
        Script::FailTimes {
            times: 1,
            message: "Please verify you are human".into(),
            then: Box::new(Script::produce("a.mp4", b"a")),
        },
    ));
    let (downloader, _dir) = create_test_downloader(extractor.clone()).await;

    let result = downloader.execute(JobRequest::single(A)).await.unwrap();

    assert_eq!(result.outcomes[0].strategy, Some(1));
    let seen = extractor.credentials_seen();
    assert!(matches!(seen[0], crate::strategy::CredentialSource::Browser(_)));
    assert_eq!(seen[1], crate::strategy::CredentialSource::None);
}

#[tokio::test]
async fn workspace_root_above_the_store_is_refused_before_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = super::test_helpers::test_config(dir.path());
    config.download.workspace_dir = dir.path().to_path_buf();
    std::fs::create_dir_all(&config.download.store_dir).unwrap();
    let kept = config.download.store_dir.join("keep.mp4");
    std::fs::write(&kept, b"keep").unwrap();

    let result =
        super::MediaDownloader::with_extractor(config, Arc::new(ScriptedExtractor::new())).await;

    assert!(matches!(result, Err(Error::Config { .. })));
    assert!(kept.exists());
}
