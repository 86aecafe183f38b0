//! 断点恢复集成测试
//!
//! 在第 5 段后中断十段任务，再用新的编排器恢复，检查产物既不缺段也不重复

use epub2pdf::task::{JobOptions, JobStatus, JobStore, OutputFormat};
use epub2pdf::translation::backend::BackendKind;
use epub2pdf::translation::TranslationError;

mod common {
    include!("common/mod.rs");
}

use common::{drain, marker, numbered_epub, orchestrator_with, ScriptedBackend};

const SEGMENTS: usize = 10;

fn one_block_per_segment() -> JobOptions {
    JobOptions {
        max_segment_chars: 100,
        output: OutputFormat::Text,
        ..JobOptions::default()
    }
}

/// 第 5 次后端调用后请求取消，模拟进程在第 5 段后退出
fn interrupting_backend(jobs: JobStore) -> ScriptedBackend {
    ScriptedBackend::uppercase(BackendKind::DeepSeek).on_call(move |count| {
        if count == 5 {
            for job in jobs.list() {
                jobs.request_cancel(&job.job_id);
            }
        }
    })
}

/// 中断后恢复：十段各出现一次
#[tokio::test]
async fn test_resume_after_interruption_produces_every_segment_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", SEGMENTS);

    // 第一次运行
    let jobs = JobStore::new();
    let first_backend = interrupting_backend(jobs.clone());
    let orchestrator = orchestrator_with(first_backend.clone(), dir.path(), jobs);
    let (_, interrupted) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;

    assert_eq!(interrupted.status, JobStatus::Cancelled);
    assert_eq!(interrupted.total_segments, SEGMENTS as u64);
    assert_eq!(interrupted.last_completed_segment_id, 5);
    assert_eq!(first_backend.call_count(), 5);

    // 新进程：新的任务表和后端，任务记录从磁盘读取
    let second_backend = ScriptedBackend::uppercase(BackendKind::DeepSeek);
    let restarted = orchestrator_with(second_backend.clone(), dir.path(), JobStore::new());
    let run = restarted
        .resume_job(&interrupted.job_id, None)
        .await
        .unwrap();
    let (events, job) = drain(run).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(second_backend.call_count(), SEGMENTS - 5);
    assert!(events.iter().any(|e| e.message.contains("已恢复 5 段")));

    // 已完成的段没有重新送去翻译
    for input in second_backend.inputs.lock().unwrap().iter() {
        for k in 1..=5 {
            assert!(!input.contains(&marker(k)), "第 {} 段被重复翻译", k);
        }
    }

    let text = std::fs::read_to_string(job.outputs.text.as_ref().unwrap()).unwrap();
    for k in 1..=SEGMENTS {
        let expected = marker(k).to_uppercase();
        assert_eq!(text.matches(&expected).count(), 1, "{} 出现次数不对", expected);
    }

    let checkpoint = restarted.store().load_checkpoint(&job.job_id).unwrap();
    let ids: Vec<u64> = checkpoint.units.iter().map(|u| u.segment_id).collect();
    assert_eq!(ids, (1..=SEGMENTS as u64).collect::<Vec<_>>());

    println!("✅ 中断于第 5 段，恢复后完成全部 {} 段", SEGMENTS);
}

/// 中断后恢复的产物与一次跑完的产物逐字节相同
#[tokio::test]
async fn test_resumed_artifact_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", SEGMENTS);

    let jobs = JobStore::new();
    let orchestrator = orchestrator_with(interrupting_backend(jobs.clone()), dir.path(), jobs);
    let (_, interrupted) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;
    assert_eq!(interrupted.status, JobStatus::Cancelled);

    let restarted = orchestrator_with(
        ScriptedBackend::uppercase(BackendKind::DeepSeek),
        dir.path(),
        JobStore::new(),
    );
    let (_, resumed) = drain(restarted.resume_job(&interrupted.job_id, None).await.unwrap()).await;
    assert_eq!(resumed.status, JobStatus::Completed);

    // 同一源文件在另一个工作目录里一次跑完
    let reference_dir = tempfile::tempdir().unwrap();
    let reference = orchestrator_with(
        ScriptedBackend::uppercase(BackendKind::DeepSeek),
        reference_dir.path(),
        JobStore::new(),
    );
    let (_, straight) = drain(reference.run_job(&source, one_block_per_segment())).await;
    assert_eq!(straight.status, JobStatus::Completed);

    let resumed_text = std::fs::read(resumed.outputs.text.as_ref().unwrap()).unwrap();
    let straight_text = std::fs::read(straight.outputs.text.as_ref().unwrap()).unwrap();
    assert_eq!(resumed_text, straight_text);

    println!("✅ 恢复产物与一次跑完的产物一致（{} 字节）", straight_text.len());
}

/// 任务运行期间的第二次恢复请求被拒绝，不会出现两条流水线
#[tokio::test]
async fn test_second_resume_while_running_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", SEGMENTS);

    let jobs = JobStore::new();
    let orchestrator = orchestrator_with(interrupting_backend(jobs.clone()), dir.path(), jobs);
    let (_, interrupted) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;
    let job_id = interrupted.job_id.clone();

    let backend = ScriptedBackend::uppercase(BackendKind::DeepSeek);
    let restarted = orchestrator_with(backend.clone(), dir.path(), JobStore::new());

    let first = restarted.resume_job(&job_id, None).await.unwrap();
    let second = restarted.resume_job(&job_id, None).await;
    assert!(matches!(second, Err(TranslationError::InvalidInput(_))));

    let (_, job) = drain(first).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_detail.is_none());
    assert_eq!(backend.call_count(), SEGMENTS - 5);
    assert!(!restarted.is_running(&job_id));

    // 上一次运行结束后可以再次恢复
    let (_, again) = drain(restarted.resume_job(&job_id, None).await.unwrap()).await;
    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(backend.call_count(), SEGMENTS - 5);

    println!("✅ 重复恢复请求被拒绝");
}

/// 恢复前的校验失败时释放运行槽位
#[tokio::test]
async fn test_failed_resume_releases_running_slot() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", SEGMENTS);
    let other = numbered_epub(dir.path(), "other.epub", SEGMENTS + 1);

    let jobs = JobStore::new();
    let orchestrator = orchestrator_with(interrupting_backend(jobs.clone()), dir.path(), jobs);
    let (_, interrupted) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;

    assert!(orchestrator
        .resume_job(&interrupted.job_id, Some(other))
        .await
        .is_err());
    assert!(!orchestrator.is_running(&interrupted.job_id));

    let (_, job) = drain(
        orchestrator
            .resume_job(&interrupted.job_id, Some(source))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(job.status, JobStatus::Completed);

    println!("✅ 校验失败后仍可恢复");
}

/// 重启后未完成的任务会被识别出来
#[tokio::test]
async fn test_restore_lists_unfinished_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", SEGMENTS);

    let jobs = JobStore::new();
    let orchestrator = orchestrator_with(interrupting_backend(jobs.clone()), dir.path(), jobs);
    let (_, mut interrupted) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;

    // 进程被杀死时记录停留在翻译中
    interrupted.status = JobStatus::Translating;
    orchestrator.store().save_job(&interrupted).unwrap();

    let restarted = orchestrator_with(
        ScriptedBackend::uppercase(BackendKind::DeepSeek),
        dir.path(),
        JobStore::new(),
    );
    let unfinished = restarted.restore_jobs().unwrap();

    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].job_id, interrupted.job_id);
    assert!(restarted.jobs().contains(&interrupted.job_id));

    println!("✅ 重启后识别出 {} 个未完成任务", unfinished.len());
}

/// 源文件被替换时拒绝恢复
#[tokio::test]
async fn test_resume_rejects_different_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", SEGMENTS);
    let other = numbered_epub(dir.path(), "other.epub", SEGMENTS + 2);

    let jobs = JobStore::new();
    let orchestrator = orchestrator_with(interrupting_backend(jobs.clone()), dir.path(), jobs);
    let (_, interrupted) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;

    let err = match orchestrator
        .resume_job(&interrupted.job_id, Some(other))
        .await
    {
        Ok(_) => panic!("不同的源文件不应被接受"),
        Err(err) => err,
    };
    assert!(matches!(err, TranslationError::SourceMismatch(_)));

    let missing = match orchestrator.resume_job("no-such-job", None).await {
        Ok(_) => panic!("不存在的任务不应被恢复"),
        Err(err) => err,
    };
    assert!(matches!(missing, TranslationError::JobNotFound(_)));

    println!("✅ 源文件不一致时拒绝恢复");
}

/// 对已完成任务再次恢复只重新合并，结果相同
#[tokio::test]
async fn test_resume_of_completed_job_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let source = numbered_epub(dir.path(), "numbered.epub", 3);

    let backend = ScriptedBackend::uppercase(BackendKind::DeepSeek);
    let orchestrator = orchestrator_with(backend.clone(), dir.path(), JobStore::new());
    let (_, job) = drain(orchestrator.run_job(&source, one_block_per_segment())).await;
    assert_eq!(job.status, JobStatus::Completed);
    let calls = backend.call_count();
    let before = std::fs::read_to_string(job.outputs.text.as_ref().unwrap()).unwrap();

    let (_, again) = drain(orchestrator.resume_job(&job.job_id, None).await.unwrap()).await;
    let after = std::fs::read_to_string(again.outputs.text.as_ref().unwrap()).unwrap();

    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(backend.call_count(), calls);
    assert_eq!(before, after);

    println!("✅ 重复恢复结果一致");
}
