//! Состояние сервера: задачи AI-генерации и кэш результатов

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use qr_art_core::ProgressObserver;
use serde::Serialize;

/// Статус задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Финальные статусы больше не меняются
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Снимок задачи для `/progress`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    /// Проценты 0-100
    pub progress: u32,
    pub step: u32,
    pub total: u32,
    /// PNG в base64
    pub result: Option<String>,
    pub error: Option<String>,
    pub scannable: Option<bool>,
}

struct TaskEntry {
    snapshot: TaskSnapshot,
    finished_at: Option<Instant>,
}

fn percent(step: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (step.min(total) as u64 * 100 / total as u64) as u32
}

fn new_task_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Хранилище задач в памяти
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, TaskEntry>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Новая задача в статусе `pending`
    pub fn create(&self, total: u32) -> String {
        let id = new_task_id();
        let snapshot = TaskSnapshot {
            task_id: id.clone(),
            status: TaskStatus::Pending,
            progress: 0,
            step: 0,
            total,
            result: None,
            error: None,
            scannable: None,
        };
        self.inner.write().insert(
            id.clone(),
            TaskEntry {
                snapshot,
                finished_at: None,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<TaskSnapshot> {
        self.inner.read().get(id).map(|e| e.snapshot.clone())
    }

    /// Изменение активной задачи. Финальные статусы не трогаются.
    fn update_active(&self, id: &str, f: impl FnOnce(&mut TaskSnapshot)) -> bool {
        let mut tasks = self.inner.write();
        let Some(entry) = tasks.get_mut(id) else {
            return false;
        };
        if entry.snapshot.status.is_terminal() {
            return false;
        }
        f(&mut entry.snapshot);
        if entry.snapshot.status.is_terminal() {
            entry.finished_at = Some(Instant::now());
        }
        true
    }

    /// `pending` -> `processing`. `false`, если задачу уже отменили.
    pub fn start(&self, id: &str) -> bool {
        let mut started = false;
        self.update_active(id, |task| {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Processing;
                started = true;
            }
        });
        started
    }

    pub fn set_step(&self, id: &str, step: u32, total: u32) {
        self.update_active(id, |task| {
            task.total = total;
            task.step = step.min(total);
            task.progress = percent(task.step, total);
        });
    }

    pub fn complete(&self, id: &str, result: String, scannable: Option<bool>) {
        self.update_active(id, |task| {
            task.status = TaskStatus::Completed;
            task.step = task.total;
            task.progress = 100;
            task.result = Some(result);
            task.scannable = scannable;
        });
    }

    pub fn fail(&self, id: &str, error: String) {
        self.update_active(id, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
        });
    }

    /// Отмена. `None` - задача не найдена, иначе статус после вызова.
    pub fn cancel(&self, id: &str) -> Option<TaskStatus> {
        self.update_active(id, |task| task.status = TaskStatus::Cancelled);
        self.inner.read().get(id).map(|e| e.snapshot.status)
    }

    pub fn is_cancelled(&self, id: &str) -> bool {
        self.inner
            .read()
            .get(id)
            .is_some_and(|e| e.snapshot.status == TaskStatus::Cancelled)
    }

    /// Удаление задач, завершённых раньше `ttl` назад
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let mut tasks = self.inner.write();
        let before = tasks.len();
        tasks.retain(|_, e| e.finished_at.map_or(true, |t| t.elapsed() < ttl));
        let evicted = before - tasks.len();
        if evicted > 0 {
            log::debug!("Evicted {} finished tasks", evicted);
        }
        evicted
    }

    /// Фоновая очистка старых задач
    pub fn spawn_eviction(&self, ttl: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let period = (ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.evict_expired(ttl);
            }
        })
    }
}

/// Прогресс движка -> задача
pub struct TaskProgress {
    store: TaskStore,
    id: String,
}

impl TaskProgress {
    pub fn new(store: TaskStore, id: String) -> Self {
        Self { store, id }
    }
}

impl ProgressObserver for TaskProgress {
    fn on_step(&self, step: u32, total: u32) {
        self.store.set_step(&self.id, step, total);
    }

    fn is_cancelled(&self) -> bool {
        self.store.is_cancelled(&self.id)
    }
}

/// Ограниченный кэш готовых картинок, вытеснение FIFO
pub struct ResultCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Ключ из отсортированных полей формы
    pub fn key<'a>(fields: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
        let mut pairs: Vec<_> = fields.into_iter().collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            inner.entries.insert(key, value);
            return;
        }
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
