//! Pipeline integration tests: real splitting and normalisation, scripted engine.

mod common;

use common::{leftovers, png_bytes, service, text_pdf, ScriptedEngine};
use mineru_ocr::{OcrError, PageResult};
use std::sync::Arc;

#[tokio::test]
async fn pdf_pages_come_back_in_order() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    let pdf = text_pdf(&["Alpha", "Beta", "Gamma"]);
    let results = svc.ocr_pdf(Some("application/pdf"), pdf).await.unwrap();

    assert_eq!(
        results,
        vec![
            PageResult::new(1, "# Alpha"),
            PageResult::new(2, "# Beta"),
            PageResult::new(3, "# Gamma"),
        ]
    );
    assert_eq!(engine.call_count(), 3);
}

#[tokio::test]
async fn failing_page_is_empty_and_others_survive() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    let pdf = text_pdf(&["One", "FAIL here", "Three"]);
    let results = svc.ocr_pdf(Some("application/pdf"), pdf).await.unwrap();

    let pages: Vec<usize> = results.iter().map(|r| r.page_num).collect();
    assert_eq!(pages, vec![1, 2, 3]);
    assert_eq!(results[0].markdown, "# One");
    assert!(results[1].is_empty());
    assert_eq!(results[2].markdown, "# Three");
    assert_eq!(engine.call_count(), 3);
}

#[tokio::test]
async fn every_page_failing_still_returns_every_page() {
    let root = tempfile::tempdir().unwrap();
    let svc = service(Arc::new(ScriptedEngine::default()), root.path());

    let pdf = text_pdf(&["FAIL", "FAIL"]);
    let results = svc.ocr_pdf(Some("application/pdf"), pdf).await.unwrap();
    assert_eq!(results, vec![PageResult::failed(1), PageResult::failed(2)]);
}

#[tokio::test]
async fn each_page_gets_its_own_directory() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    svc.ocr_pdf(Some("application/pdf"), text_pdf(&["a", "b"]))
        .await
        .unwrap();

    let calls = engine.calls.lock().unwrap();
    assert_ne!(calls[0].input.parent(), calls[1].input.parent());
    for call in calls.iter() {
        assert_eq!(call.doc_id, "parsed");
        assert_eq!(call.lang, "ch");
        assert!(call.input.ends_with("parsed.pdf"));
        assert!(call.output_dir.ends_with("output"));
    }
}

#[tokio::test]
async fn image_is_a_single_first_page() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    let result = svc.ocr_image(Some("image/png"), png_bytes()).await.unwrap();
    assert_eq!(result, PageResult::new(1, "# image"));
    assert_eq!(engine.call_count(), 1);
}

#[tokio::test]
async fn image_engine_failure_is_fatal() {
    struct Broken;
    impl mineru_ocr::Engine for Broken {
        fn parse(&self, _: &mineru_ocr::EngineRequest) -> Result<(), mineru_ocr::EngineError> {
            Err(mineru_ocr::EngineError::Other("out of memory".into()))
        }
    }
    let root = tempfile::tempdir().unwrap();
    let config = mineru_ocr::ServiceConfig::builder()
        .work_root(root.path())
        .build()
        .unwrap();
    let invoker = mineru_ocr::pipeline::parse::ParseInvoker::new(Arc::new(Broken), &config)
        .with_detector(Arc::new(common::NoAccelerators))
        .with_slot(Arc::new(mineru_ocr::DeviceSlot::new(None)));
    let svc = mineru_ocr::OcrService::with_invoker(config, invoker);

    let err = svc.ocr_image(Some("image/png"), png_bytes()).await.unwrap_err();
    assert!(matches!(err, OcrError::Engine(_)));
    assert_eq!(err.status_code(), 500);
    assert_eq!(leftovers(root.path()), 0);
}

#[tokio::test]
async fn undecodable_image_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    let err = svc
        .ocr_image(Some("image/png"), b"not a png".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::Decode { .. }));
    assert_eq!(engine.call_count(), 0);
    assert_eq!(leftovers(root.path()), 0);
}

#[tokio::test]
async fn malformed_pdf_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    let err = svc
        .ocr_pdf(Some("application/pdf"), b"%PDF-1.4 truncated".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::MalformedDocument { .. }));
    assert_eq!(engine.call_count(), 0);
    assert_eq!(leftovers(root.path()), 0);
}

#[tokio::test]
async fn wrong_content_type_creates_nothing() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let svc = service(Arc::clone(&engine), root.path());

    let err = svc
        .ocr_pdf(Some("image/png"), text_pdf(&["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::InvalidInput { .. }));
    let err = svc
        .ocr_image(Some("application/pdf"), png_bytes())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "File must be an image");
    assert_eq!(engine.call_count(), 0);
    assert_eq!(leftovers(root.path()), 0);
}

#[tokio::test]
async fn working_area_removed_after_success() {
    let root = tempfile::tempdir().unwrap();
    let svc = service(Arc::new(ScriptedEngine::default()), root.path());

    svc.ocr_pdf(Some("application/pdf"), text_pdf(&["a", "b"]))
        .await
        .unwrap();
    svc.ocr_image(Some("image/png"), png_bytes()).await.unwrap();
    assert_eq!(leftovers(root.path()), 0);
}

#[tokio::test]
async fn same_input_same_answer() {
    let root = tempfile::tempdir().unwrap();
    let svc = service(Arc::new(ScriptedEngine::default()), root.path());
    let pdf = text_pdf(&["Same", "Again"]);

    let first = svc.ocr_pdf(Some("application/pdf"), pdf.clone()).await.unwrap();
    let second = svc.ocr_pdf(Some("application/pdf"), pdf).await.unwrap();
    assert_eq!(first, second);

    let a = svc.ocr_image(Some("image/png"), png_bytes()).await.unwrap();
    let b = svc.ocr_image(Some("image/png"), png_bytes()).await.unwrap();
    assert_eq!(a.page_num, b.page_num);
}

#[tokio::test]
async fn concurrent_requests_do_not_interleave_engine_calls() {
    use mineru_ocr::{Engine, EngineError, EngineRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many calls are in flight at once.
    #[derive(Default)]
    struct Overlap {
        inner: ScriptedEngine,
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }
    impl Engine for Overlap {
        fn parse(&self, request: &EngineRequest) -> Result<(), EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            let result = self.inner.parse(request);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(Overlap::default());
    let config = mineru_ocr::ServiceConfig::builder()
        .work_root(root.path())
        .build()
        .unwrap();
    let invoker = mineru_ocr::pipeline::parse::ParseInvoker::new(engine.clone(), &config)
        .with_detector(Arc::new(common::NoAccelerators))
        .with_slot(Arc::new(mineru_ocr::DeviceSlot::new(None)));
    let svc = Arc::new(mineru_ocr::OcrService::with_invoker(config, invoker));

    let mut handles = Vec::new();
    for i in 0..4 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            let (p1, p2) = (format!("doc{i}-p1"), format!("doc{i}-p2"));
            let pdf = text_pdf(&[p1.as_str(), p2.as_str()]);
            svc.ocr_pdf(Some("application/pdf"), pdf).await.unwrap()
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let results = handle.await.unwrap();
        assert_eq!(results[0].markdown, format!("# doc{i}-p1"));
        assert_eq!(results[1].markdown, format!("# doc{i}-p2"));
    }
    assert_eq!(engine.max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_request_still_removes_its_working_area() {
    use mineru_ocr::{Engine, EngineError, EngineRequest};
    use std::time::Duration;

    /// Takes long enough for the caller to give up first.
    #[derive(Default)]
    struct Slow {
        inner: ScriptedEngine,
    }
    impl Engine for Slow {
        fn parse(&self, request: &EngineRequest) -> Result<(), EngineError> {
            std::thread::sleep(Duration::from_millis(300));
            self.inner.parse(request)
        }
    }

    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(Slow::default());
    let config = mineru_ocr::ServiceConfig::builder()
        .work_root(root.path())
        .build()
        .unwrap();
    let invoker = mineru_ocr::pipeline::parse::ParseInvoker::new(engine.clone(), &config)
        .with_detector(Arc::new(common::NoAccelerators))
        .with_slot(Arc::new(mineru_ocr::DeviceSlot::new(None)));
    let svc = mineru_ocr::OcrService::with_invoker(config, invoker);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(100),
        svc.ocr_pdf(Some("application/pdf"), text_pdf(&["late"])),
    )
    .await;
    assert!(cancelled.is_err(), "call should have been cut short");

    // The engine finishes in the background and writes its artifact; the
    // area must be gone once it has.
    let mut waited = Duration::ZERO;
    while (engine.inner.call_count() == 0 || leftovers(root.path()) > 0)
        && waited < Duration::from_secs(5)
    {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    assert_eq!(engine.inner.call_count(), 1);
    assert_eq!(leftovers(root.path()), 0);

    // Lock and device are free for the next request.
    let results = svc
        .ocr_pdf(Some("application/pdf"), text_pdf(&["next"]))
        .await
        .unwrap();
    assert_eq!(results, vec![PageResult::new(1, "# next")]);
    assert_eq!(leftovers(root.path()), 0);
}
