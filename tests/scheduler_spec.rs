use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use speculate2::speculate;
use uuid::Uuid;

use study_planner::db::Database;
use study_planner::generator::{ContentGenerator, GenerationError};
use study_planner::models::*;
use study_planner::scheduler::{Scheduler, SchedulerConfig, SchedulerError, TickReport};
use study_planner::store::{HistoryLog, PlanStore};

type Respond = dyn Fn(&str) -> Result<StudyMaterial, GenerationError> + Send + Sync;

/// Generator whose answer is decided per content reference.
struct FakeGenerator {
    respond: Box<Respond>,
    calls: Mutex<Vec<(String, NoteFormat)>>,
}

impl FakeGenerator {
    fn new(
        respond: impl Fn(&str) -> Result<StudyMaterial, GenerationError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn returning(notes: &str) -> Arc<Self> {
        let notes = notes.to_string();
        Self::new(move |_| Ok(material(&notes)))
    }

    fn calls(&self) -> Vec<(String, NoteFormat)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(
        &self,
        content_reference: &str,
        note_format: NoteFormat,
    ) -> Result<StudyMaterial, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((content_reference.to_string(), note_format));
        (self.respond)(content_reference)
    }
}

struct SlowGenerator;

#[async_trait]
impl ContentGenerator for SlowGenerator {
    async fn generate(&self, _: &str, _: NoteFormat) -> Result<StudyMaterial, GenerationError> {
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Ok(material("too late"))
    }
}

struct PanickingGenerator;

#[async_trait]
impl ContentGenerator for PanickingGenerator {
    async fn generate(&self, _: &str, _: NoteFormat) -> Result<StudyMaterial, GenerationError> {
        panic!("generator bug");
    }
}

/// Plan store that can be told to fail specific operations.
struct FlakyPlans {
    inner: Database,
    fail_query: bool,
    fail_claim_for: Option<Uuid>,
    /// Report this plan as already claimed by another writer.
    lose_claim_for: Option<Uuid>,
}

impl FlakyPlans {
    fn over(db: &Database) -> Self {
        Self {
            inner: db.clone(),
            fail_query: false,
            fail_claim_for: None,
            lose_claim_for: None,
        }
    }
}

impl PlanStore for FlakyPlans {
    fn list_due_pending(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<StudyPlan>> {
        if self.fail_query {
            return Err(anyhow!("database is locked"));
        }
        self.inner.list_due_pending(now)
    }

    fn claim(&self, id: Uuid) -> anyhow::Result<bool> {
        if self.fail_claim_for == Some(id) {
            return Err(anyhow!("disk I/O error"));
        }
        if self.lose_claim_for == Some(id) {
            return Ok(false);
        }
        PlanStore::claim(&self.inner, id)
    }

    fn update_status(&self, id: Uuid, status: PlanStatus) -> anyhow::Result<bool> {
        PlanStore::update_status(&self.inner, id, status)
    }

    fn fail_stale_processing(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>> {
        self.inner.fail_stale_processing(cutoff)
    }
}

struct BrokenHistory;

impl HistoryLog for BrokenHistory {
    fn append(&self, _: CreateHistoryInput) -> anyhow::Result<HistoryEntry> {
        Err(anyhow!("history table is read-only"))
    }
}

fn material(notes: &str) -> StudyMaterial {
    StudyMaterial {
        notes: notes.to_string(),
        quiz: Vec::new(),
    }
}

fn open() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    db
}

fn jan(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

/// A pending plan scheduled for `at`, created the day before it.
fn pending_plan(db: &Database, reference: Option<&str>, at: DateTime<Utc>) -> StudyPlan {
    let plan = db
        .create_study_plan_at(
            CreateStudyPlanInput {
                title: format!("plan for {}", reference.unwrap_or("nothing")),
                content_reference: reference.map(str::to_string),
                note_format: NoteFormat::Summary,
                scheduled_time: Some(at),
            },
            at - Duration::days(1),
        )
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Pending);
    plan
}

fn scheduler(db: &Database, generator: Arc<dyn ContentGenerator>) -> Scheduler {
    Scheduler::new(Arc::new(db.clone()), Arc::new(db.clone()), generator)
}

fn status_of(db: &Database, plan: &StudyPlan) -> PlanStatus {
    db.get_study_plan(plan.id).unwrap().unwrap().status
}

speculate! {
    describe "a scheduler tick" {
        before {
            let db = open();
        }

        it "completes a due plan and records its history" {
            let plan = pending_plan(&db, Some("https://youtu.be/dQw4w9WgXcQ"), jan(1));
            let generator = FakeGenerator::returning("N");

            let report = tokio_test::block_on(scheduler(&db, generator.clone()).tick_at(jan(2))).unwrap();

            assert_eq!(report, TickReport { due: 1, completed: 1, failed: 0, skipped: 0 });
            assert_eq!(status_of(&db, &plan), PlanStatus::Completed);

            let history = db.list_history().unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].kind, HistoryKind::StudyPlan);
            assert_eq!(Some(history[0].content.clone()), plan.content_reference);
            assert_eq!(history[0].notes, "N");
            assert_eq!(
                generator.calls(),
                vec![("https://youtu.be/dQw4w9WgXcQ".to_string(), NoteFormat::Summary)]
            );
        }

        it "fails a plan whose generation hits the quota" {
            let plan = pending_plan(&db, Some("https://youtu.be/quota"), jan(1));
            let generator = FakeGenerator::new(|_| {
                Err(GenerationError::RateLimited("Quota exceeded for requests per minute".into()))
            });

            let report = tokio_test::block_on(scheduler(&db, generator).tick_at(jan(2))).unwrap();

            assert_eq!(report.failed, 1);
            assert_eq!(status_of(&db, &plan), PlanStatus::Failed);
            assert!(db.list_history().unwrap().is_empty());
        }

        it "fails a plan whose output cannot be parsed" {
            let plan = pending_plan(&db, Some("https://youtu.be/garbage"), jan(1));
            let generator = FakeGenerator::new(|_| {
                Err(GenerationError::MalformedOutput("expected value at line 1".into()))
            });

            tokio_test::block_on(scheduler(&db, generator).tick_at(jan(2))).unwrap();

            assert_eq!(status_of(&db, &plan), PlanStatus::Failed);
            assert!(db.list_history().unwrap().is_empty());
        }

        it "leaves future plans untouched" {
            let plan = pending_plan(&db, Some("https://youtu.be/later"), jan(3));
            let generator = FakeGenerator::returning("N");

            let report = tokio_test::block_on(scheduler(&db, generator.clone()).tick_at(jan(2))).unwrap();

            assert_eq!(report, TickReport::default());
            assert_eq!(db.get_study_plan(plan.id).unwrap().unwrap(), plan);
            assert!(generator.calls().is_empty());
            assert!(db.list_history().unwrap().is_empty());
        }

        it "never picks up unscheduled plans" {
            let plan = db
                .create_study_plan(CreateStudyPlanInput {
                    title: "manual".into(),
                    content_reference: Some("https://youtu.be/manual".into()),
                    note_format: NoteFormat::Flashcards,
                    scheduled_time: None,
                })
                .unwrap();

            let report = tokio_test::block_on(
                scheduler(&db, FakeGenerator::returning("N")).tick_at(Utc::now() + Duration::days(365)),
            )
            .unwrap();

            assert_eq!(report.due, 0);
            assert_eq!(status_of(&db, &plan), PlanStatus::NotStarted);
        }

        it "keeps processing after one plan fails" {
            let first = pending_plan(&db, Some("https://youtu.be/broken"), jan(1));
            let second = pending_plan(&db, Some("https://youtu.be/fine"), jan(1) + Duration::hours(1));
            let generator = FakeGenerator::new(|reference| {
                if reference.ends_with("broken") {
                    Err(GenerationError::Transport("connection reset".into()))
                } else {
                    Ok(material("second notes"))
                }
            });

            let report = tokio_test::block_on(scheduler(&db, generator.clone()).tick_at(jan(2))).unwrap();

            assert_eq!(report, TickReport { due: 2, completed: 1, failed: 1, skipped: 0 });
            assert_eq!(status_of(&db, &first), PlanStatus::Failed);
            assert_eq!(status_of(&db, &second), PlanStatus::Completed);

            let history = db.list_history().unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].content, "https://youtu.be/fine");

            let order: Vec<_> = generator.calls().into_iter().map(|(r, _)| r).collect();
            assert_eq!(order, vec!["https://youtu.be/broken", "https://youtu.be/fine"]);
        }

        it "is a no-op when nothing is due" {
            let report = tokio_test::block_on(
                scheduler(&db, FakeGenerator::returning("N")).tick_at(jan(2)),
            )
            .unwrap();

            assert_eq!(report, TickReport::default());
            assert!(db.list_study_plans(None).unwrap().is_empty());
            assert!(db.list_history().unwrap().is_empty());
        }

        it "does not reprocess a plan on the next tick" {
            let plan = pending_plan(&db, Some("https://youtu.be/once"), jan(1));
            let generator = FakeGenerator::returning("N");
            let scheduler = scheduler(&db, generator.clone());

            tokio_test::block_on(async {
                scheduler.tick_at(jan(2)).await.unwrap();
                let again = scheduler.tick_at(jan(3)).await.unwrap();
                assert_eq!(again, TickReport::default());
            });

            assert_eq!(generator.calls().len(), 1);
            assert_eq!(db.list_history_by_content("https://youtu.be/once").unwrap().len(), 1);
            assert_eq!(status_of(&db, &plan), PlanStatus::Completed);
        }

        it "fails a plan with no content reference without calling the generator" {
            let plan = pending_plan(&db, None, jan(1));
            let generator = FakeGenerator::returning("N");

            let report = tokio_test::block_on(scheduler(&db, generator.clone()).tick_at(jan(2))).unwrap();

            assert_eq!(report.failed, 1);
            assert_eq!(status_of(&db, &plan), PlanStatus::Failed);
            assert!(generator.calls().is_empty());
        }

        it "fails a plan whose generation times out" {
            let plan = pending_plan(&db, Some("https://youtu.be/slow"), jan(1));
            let scheduler = scheduler(&db, Arc::new(SlowGenerator)).with_config(SchedulerConfig {
                generation_timeout: StdDuration::from_millis(50),
                ..SchedulerConfig::default()
            });

            let report = tokio_test::block_on(scheduler.tick_at(jan(2))).unwrap();

            assert_eq!(report.failed, 1);
            assert_eq!(status_of(&db, &plan), PlanStatus::Failed);
        }

        it "contains a panicking generator to its plan" {
            let plan = pending_plan(&db, Some("https://youtu.be/panic"), jan(1));

            let report = tokio_test::block_on(
                scheduler(&db, Arc::new(PanickingGenerator)).tick_at(jan(2)),
            )
            .unwrap();

            assert_eq!(report.failed, 1);
            assert_eq!(status_of(&db, &plan), PlanStatus::Failed);
        }
    }

    describe "storage failures" {
        before {
            let db = open();
        }

        it "leaves a plan pending when its claim cannot be written" {
            let stuck = pending_plan(&db, Some("https://youtu.be/stuck"), jan(1));
            let other = pending_plan(&db, Some("https://youtu.be/other"), jan(1) + Duration::hours(1));
            let plans = FlakyPlans {
                fail_claim_for: Some(stuck.id),
                ..FlakyPlans::over(&db)
            };
            let generator = FakeGenerator::returning("N");
            let scheduler = Scheduler::new(Arc::new(plans), Arc::new(db.clone()), generator.clone());

            let report = tokio_test::block_on(scheduler.tick_at(jan(2))).unwrap();

            assert_eq!(report, TickReport { due: 2, completed: 1, failed: 0, skipped: 1 });
            assert_eq!(status_of(&db, &stuck), PlanStatus::Pending);
            assert_eq!(status_of(&db, &other), PlanStatus::Completed);
            assert_eq!(generator.calls().len(), 1);
        }

        it "skips a plan another writer claimed first" {
            let taken = pending_plan(&db, Some("https://youtu.be/taken"), jan(1));
            let plans = FlakyPlans {
                lose_claim_for: Some(taken.id),
                ..FlakyPlans::over(&db)
            };
            let generator = FakeGenerator::returning("N");
            let scheduler = Scheduler::new(Arc::new(plans), Arc::new(db.clone()), generator.clone());

            let report = tokio_test::block_on(scheduler.tick_at(jan(2))).unwrap();

            assert_eq!(report, TickReport { due: 1, completed: 0, failed: 0, skipped: 1 });
            assert!(generator.calls().is_empty());
            assert!(db.list_history().unwrap().is_empty());
            assert_eq!(db.get_study_plan(taken.id).unwrap().unwrap(), taken);
        }

        it "does not run a plan twice when a stale due list is replayed" {
            let plan = pending_plan(&db, Some("https://youtu.be/replayed"), jan(1));
            let stale_view = db.list_due_pending(jan(2)).unwrap();
            assert!(PlanStore::claim(&db, plan.id).unwrap());

            struct Replay {
                inner: Database,
                due: Vec<StudyPlan>,
            }

            impl PlanStore for Replay {
                fn list_due_pending(&self, _: DateTime<Utc>) -> anyhow::Result<Vec<StudyPlan>> {
                    Ok(self.due.clone())
                }

                fn claim(&self, id: Uuid) -> anyhow::Result<bool> {
                    PlanStore::claim(&self.inner, id)
                }

                fn update_status(&self, id: Uuid, status: PlanStatus) -> anyhow::Result<bool> {
                    PlanStore::update_status(&self.inner, id, status)
                }

                fn fail_stale_processing(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>> {
                    self.inner.fail_stale_processing(cutoff)
                }
            }

            let generator = FakeGenerator::returning("N");
            let scheduler = Scheduler::new(
                Arc::new(Replay { inner: db.clone(), due: stale_view }),
                Arc::new(db.clone()),
                generator.clone(),
            );

            let report = tokio_test::block_on(scheduler.tick_at(jan(2))).unwrap();

            assert_eq!(report.skipped, 1);
            assert!(generator.calls().is_empty());
            assert!(db.list_history().unwrap().is_empty());
            assert_eq!(status_of(&db, &plan), PlanStatus::Processing);
        }

        it "aborts the tick when the due query fails" {
            let plan = pending_plan(&db, Some("https://youtu.be/any"), jan(1));
            let plans = FlakyPlans {
                fail_query: true,
                ..FlakyPlans::over(&db)
            };
            let scheduler = Scheduler::new(Arc::new(plans), Arc::new(db.clone()), FakeGenerator::returning("N"));

            let result = tokio_test::block_on(scheduler.tick_at(jan(2)));

            assert!(matches!(result, Err(SchedulerError::Query(_))));
            assert_eq!(status_of(&db, &plan), PlanStatus::Pending);
        }

        it "still completes a plan when history cannot be written" {
            let plan = pending_plan(&db, Some("https://youtu.be/nohistory"), jan(1));
            let scheduler = Scheduler::new(
                Arc::new(db.clone()),
                Arc::new(BrokenHistory),
                FakeGenerator::returning("N"),
            );

            let report = tokio_test::block_on(scheduler.tick_at(jan(2))).unwrap();

            assert_eq!(report.completed, 1);
            assert_eq!(status_of(&db, &plan), PlanStatus::Completed);
            assert!(db.list_history().unwrap().is_empty());
        }
    }

    describe "stale claim recovery" {
        it "fails plans left processing by an earlier run" {
            let db = open();
            let plan = pending_plan(&db, Some("https://youtu.be/crashed"), jan(1));
            assert!(PlanStore::claim(&db, plan.id).unwrap());

            let scheduler = scheduler(&db, FakeGenerator::returning("N")).with_config(SchedulerConfig {
                stale_processing_after: Some(StdDuration::from_secs(60)),
                ..SchedulerConfig::default()
            });

            assert!(scheduler.recover_stale(Utc::now()).is_empty());
            assert_eq!(status_of(&db, &plan), PlanStatus::Processing);

            let recovered = scheduler.recover_stale(Utc::now() + Duration::minutes(5));
            assert_eq!(recovered, vec![plan.id]);
            assert_eq!(status_of(&db, &plan), PlanStatus::Failed);
        }

        it "does nothing when recovery is disabled" {
            let db = open();
            let plan = pending_plan(&db, Some("https://youtu.be/crashed"), jan(1));
            PlanStore::claim(&db, plan.id).unwrap();

            let scheduler = scheduler(&db, FakeGenerator::returning("N")).with_config(SchedulerConfig {
                stale_processing_after: None,
                ..SchedulerConfig::default()
            });

            assert!(scheduler.recover_stale(Utc::now() + Duration::days(1)).is_empty());
            assert_eq!(status_of(&db, &plan), PlanStatus::Processing);
        }
    }

    describe "the background loop" {
        it "processes due plans until stopped" {
            let db = open();
            let plan = pending_plan(&db, Some("https://youtu.be/loop"), jan(1));
            let generator = FakeGenerator::returning("N");
            let scheduler = scheduler(&db, generator.clone()).with_config(SchedulerConfig {
                tick_interval: StdDuration::from_secs(3600),
                ..SchedulerConfig::default()
            });

            tokio_test::block_on(async {
                let handle = scheduler.start();
                for _ in 0..100 {
                    if status_of(&db, &plan) == PlanStatus::Completed {
                        break;
                    }
                    tokio::time::sleep(StdDuration::from_millis(10)).await;
                }
                assert!(handle.is_running());
                handle.stop().await;
            });

            assert_eq!(status_of(&db, &plan), PlanStatus::Completed);
            assert_eq!(generator.calls().len(), 1);
        }
    }
}
