mod common;

use common::{MockProvider, Workspace, one_slide};
use slide_genie::SlideDeck;
use slide_genie::orchestrator::CollectedProgress;
use slide_genie::pptx::Presentation;

const CHAPTER: &str = "Diagrams";

#[tokio::test]
async fn single_topic_produces_title_and_content_slide() {
    let workspace = Workspace::new("Intro\n");
    let provider = MockProvider::answering(one_slide(""));
    let progress = CollectedProgress::default();
    let run = workspace
        .orchestrator(provider.clone(), None, progress.clone())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();

    assert_eq!(run.generated, vec!["Intro"]);
    assert!(run.skipped.is_empty());
    assert!(run.failed.is_empty());
    assert_eq!(provider.calls(), 1);

    let document = Presentation::load(&run.document).unwrap();
    assert_eq!(document.slide_count().unwrap(), 2);
    assert_eq!(document.picture_count().unwrap(), 0);
    assert_eq!(document.slide_text(0).unwrap(), "Intro\nDiagrams");
    assert_eq!(
        document.notes_text(1).unwrap().as_deref(),
        Some("Ask who has drawn one")
    );

    let sentinel = workspace.chapter_dir(CHAPTER).join("Intro.txt");
    let dump: SlideDeck = serde_json::from_str(&std::fs::read_to_string(sentinel).unwrap()).unwrap();
    assert_eq!(dump.slides[0].title, "What is a flowchart");

    let lines = progress.lines();
    assert_eq!(lines[0], "Generating slides for topic: Intro");
    assert!(lines[1].starts_with("All slides have been successfully generated in folder "));
}

#[tokio::test]
async fn second_run_skips_completed_topics() {
    let workspace = Workspace::new("Intro\n\nLoops\n");
    let provider = MockProvider::answering(one_slide(""));
    let first = workspace
        .orchestrator(provider.clone(), None, CollectedProgress::default())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();
    assert_eq!(first.generated, vec!["Intro", "Loops"]);
    let document = std::fs::read(&first.document).unwrap();
    let entries = std::fs::read_dir(workspace.chapter_dir(CHAPTER)).unwrap().count();

    let progress = CollectedProgress::default();
    let second = workspace
        .orchestrator(provider.clone(), None, progress.clone())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();
    assert!(second.generated.is_empty());
    assert_eq!(second.skipped, vec!["Intro", "Loops"]);
    assert_eq!(provider.calls(), 2);
    assert_eq!(std::fs::read(&second.document).unwrap(), document);
    assert_eq!(
        std::fs::read_dir(workspace.chapter_dir(CHAPTER)).unwrap().count(),
        entries
    );
    assert!(progress.lines()[0].ends_with("Intro.txt already exists. Skipping regeneration."));

    let saved = Presentation::load(&second.document).unwrap();
    assert_eq!(saved.slide_count().unwrap(), 4);
}

#[tokio::test]
async fn missing_renderer_still_saves_the_deck() {
    let workspace = Workspace::new("Sequence\n");
    let missing = workspace.dir.path().join("no-mmdc");
    let provider = MockProvider::answering(one_slide("sequenceDiagram\nA->>B: hello"));
    let run = workspace
        .orchestrator(provider, Some(&missing), CollectedProgress::default())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();

    let document = Presentation::load(&run.document).unwrap();
    assert_eq!(document.slide_count().unwrap(), 2);
    assert_eq!(document.picture_count().unwrap(), 0);
    assert!(workspace.chapter_dir(CHAPTER).join("Sequence.txt").is_file());
}

#[tokio::test]
async fn failed_generation_writes_error_slide() {
    let workspace = Workspace::new("Broken\n");
    let run = workspace
        .orchestrator(MockProvider::failing(), None, CollectedProgress::default())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();
    assert_eq!(run.failed, vec!["Broken"]);

    let document = Presentation::load(&run.document).unwrap();
    assert_eq!(document.slide_count().unwrap(), 2);
    assert_eq!(document.slide_text(1).unwrap(), "Error\nFailed to generate slides");
    let dump = std::fs::read_to_string(workspace.chapter_dir(CHAPTER).join("Broken.txt")).unwrap();
    let deck: SlideDeck = serde_json::from_str(&dump).unwrap();
    assert!(deck.is_error_placeholder());
}

#[tokio::test]
async fn missing_template_aborts_without_sentinel() {
    let workspace = Workspace::new("Intro\n");
    std::fs::remove_file(&workspace.template).unwrap();
    let err = workspace
        .orchestrator(MockProvider::answering(one_slide("")), None, CollectedProgress::default())
        .generate_chapter(CHAPTER)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("template not found"));
    assert!(!workspace.chapter_dir(CHAPTER).join("Intro.txt").exists());
}

#[tokio::test]
async fn topic_with_path_separator_does_not_block_the_chapter() {
    let workspace = Workspace::new("Intro\nInput/Output\nLoops\n");
    let provider = MockProvider::answering(one_slide(""));
    let run = workspace
        .orchestrator(provider.clone(), None, CollectedProgress::default())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();
    assert_eq!(run.generated, vec!["Intro", "Input/Output", "Loops"]);

    let folder = workspace.chapter_dir(CHAPTER);
    assert!(folder.join("Input_Output.txt").is_file());
    assert!(folder.join("Loops.txt").is_file());
    assert!(!folder.join("Input").exists());

    let second = workspace
        .orchestrator(provider.clone(), None, CollectedProgress::default())
        .generate_chapter(CHAPTER)
        .await
        .unwrap();
    assert_eq!(second.skipped, vec!["Intro", "Input/Output", "Loops"]);
    assert_eq!(provider.calls(), 3);
}
