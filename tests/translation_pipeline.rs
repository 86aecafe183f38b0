//! 翻译管道集成测试
//!
//! 长文本切分、批量合并与拆回、回退降级以及完整的抽取到合并流程

use std::sync::Arc;
use std::time::Duration;

use epub2pdf::extract::{BlockKind, ContentBlock};
use epub2pdf::task::{JobOptions, JobStatus, JobStore, OutputFormat};
use epub2pdf::translation::backend::{BackendKind, Backends, Simulator};
use epub2pdf::translation::pipeline::BatchMode;
use epub2pdf::translation::{BackendError, BackendErrorKind, BatchTranslator};

mod common {
    include!("common/mod.rs");
}

use common::{
    drain, engine_with, manifest_epub, orchestrator_with, plain_chapter_html, three_chapter_epub,
    ScriptedBackend,
};

fn block(sequence: u64, text: &str) -> ContentBlock {
    ContentBlock {
        sequence,
        kind: BlockKind::Paragraph,
        text: text.to_string(),
        source_ref: format!("test.xhtml#{}", sequence),
    }
}

/// 一万字符的段落：上限 3000 时调用 4 次，拼接结果与整段翻译一致
#[tokio::test]
async fn test_long_paragraph_is_split_into_four_calls() {
    let sentence = "The quick brown fox jumps over the lazy dog. ";
    let text = format!("{}Last line.", sentence.repeat(222));
    assert_eq!(text.chars().count(), 10_000);

    let backend =
        ScriptedBackend::dictionary(BackendKind::SiliconFlow).with_max_input(3000);
    let backends = Backends::offline().with_backend(Arc::new(backend.clone()));

    let translated = backends
        .translate(&text, BackendKind::SiliconFlow)
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 4);
    for input in backend.inputs.lock().unwrap().iter() {
        assert!(input.chars().count() <= 3000);
    }

    let reference = Simulator::plain().simulate(&text);
    assert_eq!(translated, reference);

    println!("✅ 长段落切分: {} 次调用", backend.call_count());
}

/// 同一段内的重复文本只翻译一次，合并请求按分隔符拆回
#[tokio::test]
async fn test_batch_combines_and_deduplicates() {
    let backend = ScriptedBackend::uppercase(BackendKind::DeepSeek);
    let translator = BatchTranslator::new(engine_with(backend.clone()), Duration::ZERO);

    let blocks = vec![
        block(1, "first paragraph"),
        block(2, "second paragraph"),
        block(3, "first paragraph"),
        block(4, "42"),
    ];
    let outcome = translator.translate_blocks(&blocks).await;

    assert_eq!(outcome.mode, BatchMode::Combined);
    assert_eq!(backend.call_count(), 1);
    assert!(!outcome.degraded);

    let texts: Vec<&str> = outcome.translations.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["FIRST PARAGRAPH", "SECOND PARAGRAPH", "FIRST PARAGRAPH", "42"]
    );

    println!("✅ 批量合并: {:?}", texts);
}

/// 后端吞掉分隔符时改为逐条翻译
#[tokio::test]
async fn test_delimiter_loss_falls_back_to_individual_calls() {
    let backend = ScriptedBackend::new(BackendKind::SiliconFlow, |text| {
        Ok(text
            .lines()
            .filter(|line| !line.contains("[[SEG-"))
            .collect::<Vec<_>>()
            .join("\n")
            .to_uppercase())
    });
    let translator = BatchTranslator::new(engine_with(backend.clone()), Duration::ZERO);

    let blocks = vec![block(1, "alpha text"), block(2, "beta text"), block(3, "gamma text")];
    let outcome = translator.translate_blocks(&blocks).await;

    assert_eq!(outcome.mode, BatchMode::Individual);
    assert_eq!(backend.call_count(), 4);
    let texts: Vec<&str> = outcome.translations.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["ALPHA TEXT", "BETA TEXT", "GAMMA TEXT"]);

    println!("✅ 分隔符丢失后逐条翻译");
}

/// 主后端余额不足时由模拟器兜底，结果标记为降级
#[tokio::test]
async fn test_exhausted_backend_degrades_to_simulator() {
    let backend = ScriptedBackend::new(BackendKind::SiliconFlow, |_| {
        Err(BackendError::new(
            BackendKind::SiliconFlow,
            BackendErrorKind::QuotaExhausted,
            "余额不足",
        ))
    });
    let translator = BatchTranslator::new(engine_with(backend.clone()), Duration::ZERO);

    let blocks = vec![block(1, "the book"), block(2, "the world")];
    let outcome = translator.translate_blocks(&blocks).await;

    assert!(outcome.degraded);
    assert_eq!(backend.call_count(), 1);
    for (translated, original) in outcome.translations.iter().zip(&blocks) {
        assert!(translated.text.contains("【原文】"));
        assert!(translated.text.ends_with(&original.text));
    }

    println!("✅ 回退到离线模拟器并标记降级");
}

/// 完整流程：三章 EPUB 翻译为文本产物
#[tokio::test]
async fn test_epub_to_text_job_completes() {
    let dir = tempfile::tempdir().unwrap();
    let source = three_chapter_epub(dir.path());
    let backend = ScriptedBackend::uppercase(BackendKind::DeepSeek);
    let orchestrator = orchestrator_with(backend.clone(), dir.path(), JobStore::new());

    let run = orchestrator.run_job(&source, JobOptions::default());
    let job_id = run.job_id.clone();
    let (events, job) = drain(run).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.title, "A Small Journey");
    assert_eq!(job.last_completed_segment_id, job.total_segments);
    assert!(job.fingerprint.is_some());

    // 进度单调不减，以完成事件结束
    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(events.last().map(|e| e.status), Some(JobStatus::Completed));

    let output = job.outputs.text.clone().unwrap();
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("《A Small Journey》\n\n"));
    assert!(text.contains("THE JOURNEY BEGINS IN A SMALL TOWN."));
    assert!(text.contains("EVERYONE RETURNS HOME."));
    assert!(output.to_string_lossy().contains(&job_id));

    // 任务记录已落盘
    let persisted = orchestrator.store().load_job(&job_id).unwrap().unwrap();
    assert_eq!(persisted.status, JobStatus::Completed);

    println!("✅ EPUB 翻译任务完成: {} 段", job.total_segments);
}

/// 不翻译时原文直通，仍写检查点
#[tokio::test]
async fn test_passthrough_job_makes_no_backend_calls() {
    let dir = tempfile::tempdir().unwrap();
    let source = three_chapter_epub(dir.path());
    let backend = ScriptedBackend::uppercase(BackendKind::DeepSeek);
    let orchestrator = orchestrator_with(backend.clone(), dir.path(), JobStore::new());

    let options = JobOptions {
        translate: false,
        ..JobOptions::default()
    };
    let (_, job) = drain(orchestrator.run_job(&source, options)).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(backend.call_count(), 0);

    let checkpoint = orchestrator.store().load_checkpoint(&job.job_id).unwrap();
    assert_eq!(checkpoint.units.len() as u64, job.total_segments);

    let text = std::fs::read_to_string(job.outputs.text.unwrap()).unwrap();
    assert!(text.contains("The journey begins in a small town."));

    println!("✅ 原文直通");
}

/// 超长段落被切到多段后，文本产物里仍是一个段落
#[tokio::test]
async fn test_split_paragraph_stays_one_paragraph_in_text_output() {
    let dir = tempfile::tempdir().unwrap();
    let paragraph = ["Alpha beta gamma delta."; 10].join(" ");
    let source = manifest_epub(
        dir.path(),
        "long.epub",
        "Book",
        &[(
            "only.xhtml".to_string(),
            "Only".to_string(),
            plain_chapter_html("Only", &paragraph),
        )],
    );
    let orchestrator = orchestrator_with(
        ScriptedBackend::uppercase(BackendKind::DeepSeek),
        dir.path(),
        JobStore::new(),
    );

    let options = JobOptions {
        translate: false,
        max_segment_chars: 100,
        output: OutputFormat::Text,
        ..JobOptions::default()
    };
    let (_, job) = drain(orchestrator.run_job(&source, options)).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_segments, 3);
    let text = std::fs::read_to_string(job.outputs.text.unwrap()).unwrap();
    assert_eq!(text, format!("《Book》\n\n{}", paragraph));

    println!("✅ {} 段还原为一个段落", job.total_segments);
}
