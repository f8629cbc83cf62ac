use amy::environment::EnvironmentContext;
use amy::history::{FailureHistory, FailureHistoryStore, FailureRecord, MAX_HISTORY_SIZE};
use amy::llm::parse_proposal;
use amy::prompt::PromptBuilder;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_environment() -> EnvironmentContext {
    EnvironmentContext {
        platform: "linux".to_string(),
        release: "6.8.0-45-generic".to_string(),
        arch: "x64".to_string(),
        shell: "zsh".to_string(),
        cwd: "/home/dev/projects/amy".to_string(),
        is_root: false,
    }
}

fn full_history() -> FailureHistory {
    let mut history = FailureHistory::default();
    for i in 0..MAX_HISTORY_SIZE {
        history.push(FailureRecord::new(
            format!("show the tree of directory number {i}"),
            format!("tree -L {} ./dir_{i:03}", i % 4 + 1),
            format!("Command failed with exit code 127: tree\nsh: 1: tree: not found ({i})"),
        ));
    }
    history
}

fn bench_build_prompt(c: &mut Criterion) {
    let environment = synthetic_environment();
    let history = full_history();

    c.bench_function("build_prompt_full_history", |b| {
        b.iter(|| black_box(PromptBuilder::build(&environment, black_box(&history), false)));
    });

    c.bench_function("build_prompt_explain_empty_history", |b| {
        let empty = FailureHistory::default();
        b.iter(|| black_box(PromptBuilder::build(&environment, &empty, true)));
    });
}

fn bench_parse_proposal(c: &mut Criterion) {
    let structured = "```json\n{\"command\": \"lsof -ti:5000 | xargs kill -9\", \"executable\": true, \"explanation\": \"The 'lsof' command lists open files.\\nThe '-ti:5000' flag finds processes using port 5000.\"}\n```";
    let plain = "find . -type f -name '*.log' -mtime +7 -print";
    let narrated = "{\"command\": \"echo 'Hello! How can I assist you today?'\", \"executable\": false}";

    c.bench_function("parse_structured_fenced", |b| {
        b.iter(|| black_box(parse_proposal(black_box(structured), true)));
    });
    c.bench_function("parse_plain_fallback", |b| {
        b.iter(|| black_box(parse_proposal(black_box(plain), false)));
    });
    c.bench_function("parse_echo_sanitized", |b| {
        b.iter(|| black_box(parse_proposal(black_box(narrated), false)));
    });
}

fn bench_history_record(c: &mut Criterion) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FailureHistoryStore::new(temp.path().join("command-history.json"));
    for i in 0..MAX_HISTORY_SIZE {
        store
            .record(&format!("intent {i}"), "tree", "not found")
            .expect("seed history");
    }

    c.bench_function("history_record_at_cap", |b| {
        b.iter(|| {
            store
                .record(black_box("show directory tree"), "tree", "command not found: tree")
                .expect("record should succeed");
        });
    });
}

criterion_group!(
    perf_core,
    bench_build_prompt,
    bench_parse_proposal,
    bench_history_record
);
criterion_main!(perf_core);
