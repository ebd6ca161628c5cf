//! A todo list model that auto-saves after edits settle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use settle_core::commit::{DebounceConfig, DebouncedCommit};
use settle_core::error::{BridgeError, Result};
use settle_core::reactive::{Memo, Runtime, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    title: String,
    done: bool,
}

/// In-memory stand-in for persistent storage.
#[derive(Clone, Default)]
struct Storage {
    writes: Arc<Mutex<Vec<String>>>,
}

impl Storage {
    fn save(&self, todos: &[Todo]) -> Result<()> {
        let json = serde_json::to_string(todos).map_err(BridgeError::commit)?;
        self.writes.lock().unwrap().push(json);
        Ok(())
    }

    fn writes(&self) -> Vec<Vec<Todo>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }
}

struct TodosModel {
    is_initialized: Signal<bool>,
    todos: Signal<Vec<Todo>>,
    remaining: Memo<usize>,
    autosave: DebouncedCommit<Vec<Todo>>,
}

impl TodosModel {
    fn new(storage: Storage) -> Result<Self> {
        let is_initialized = Signal::new(false);
        let todos = Signal::new(Vec::<Todo>::new());

        let remaining = Memo::new({
            let todos = todos.clone();
            move || todos.get().iter().filter(|todo| !todo.done).count()
        });

        let autosave = DebouncedCommit::new(
            is_initialized.read_only(),
            todos.read_only(),
            DebounceConfig::from_json(r#"{"delay_ms": 1000}"#)?,
            move |snapshot: Vec<Todo>| {
                let storage = storage.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    storage.save(&snapshot)
                }
            },
        )?;

        Ok(Self {
            is_initialized,
            todos,
            remaining,
            autosave,
        })
    }

    fn load(&self, todos: Vec<Todo>) {
        Runtime::batch(|| {
            self.todos.set(todos);
            self.is_initialized.set(true);
        });
    }

    fn add_todo(&self, title: &str) {
        self.todos.update(|todos| {
            let mut todos = todos.clone();
            todos.push(Todo {
                title: title.to_string(),
                done: false,
            });
            todos
        });
    }

    fn complete(&self, title: &str) {
        self.todos.update(|todos| {
            todos
                .iter()
                .cloned()
                .map(|todo| Todo {
                    done: todo.done || todo.title == title,
                    ..todo
                })
                .collect()
        });
    }

    fn is_saving(&self) -> bool {
        self.autosave.busy().get()
    }
}

async fn at(start: Instant, ms: u64) {
    tokio::time::sleep_until(start + Duration::from_millis(ms)).await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edits_before_initialization_are_never_saved() {
    let start = Instant::now();
    let storage = Storage::default();
    let model = TodosModel::new(storage.clone()).unwrap();

    model.add_todo("Paint house");
    assert!(!model.is_saving());

    for ms in [100, 500, 999, 1001, 2000, 10_000] {
        at(start, ms).await;
        assert!(!model.is_saving());
    }

    assert!(storage.writes().is_empty());
    assert_eq!(model.remaining.get(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn edits_after_load_are_saved_once_settled() {
    let start = Instant::now();
    let storage = Storage::default();
    let model = TodosModel::new(storage.clone()).unwrap();

    model.load(vec![Todo {
        title: "Buy milk".into(),
        done: false,
    }]);
    at(start, 200).await;
    model.add_todo("Paint house");
    at(start, 400).await;
    model.complete("Buy milk");

    at(start, 1420).await;
    assert!(model.is_saving());
    assert!(storage.writes().is_empty());

    at(start, 1500).await;
    assert!(!model.is_saving());
    assert_eq!(
        storage.writes(),
        vec![vec![
            Todo {
                title: "Buy milk".into(),
                done: true
            },
            Todo {
                title: "Paint house".into(),
                done: false
            },
        ]]
    );
    assert_eq!(model.remaining.get(), 1);
    assert_eq!(model.autosave.last_error().get(), None);
}
