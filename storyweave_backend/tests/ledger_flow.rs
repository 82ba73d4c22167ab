use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyweave_backend::cli;
use storyweave_backend::collaborators::{DryRunTransfer, MemoryContentStorage};
use storyweave_backend::config::{RewardConfig, StoryweaveConfig, StoryweavePaths};
use storyweave_backend::database::models::{ContributionStatus, PendingReward};
use storyweave_backend::database::Database;
use storyweave_backend::events::{EventJournal, LedgerEvent, SqliteEventJournal};
use storyweave_backend::rewards::{PoolId, PoolRegistry, RewardLedger, ViewWeighting};
use storyweave_backend::store::{ContributionStore, SqliteContributionStore};
use storyweave_backend::story::{StoryService, SubmitContributionInput};
use storyweave_backend::{telemetry, CoreError};
use tempfile::{tempdir, TempDir};

struct TestHost {
    _dir: TempDir,
    config: StoryweaveConfig,
    journal: Arc<SqliteEventJournal>,
    transfer: Arc<DryRunTransfer>,
    service: StoryService,
}

fn reward_config() -> RewardConfig {
    RewardConfig {
        base_rate: 10,
        view_weighting: ViewWeighting::Flat,
        platform_pool: 500,
    }
}

fn sqlite_host() -> TestHost {
    telemetry::init_tracing();
    let dir = tempdir().expect("tempdir");
    let paths = StoryweavePaths::from_base_dir(dir.path()).expect("paths");
    let config = StoryweaveConfig::new(paths, reward_config());
    config.paths.ensure_dirs().expect("data dir");

    let database = Database::connect(&config.paths).expect("database");
    database.ensure_migrations().expect("migrations");
    let journal = Arc::new(SqliteEventJournal::new(database.clone()));
    let store: Arc<dyn ContributionStore> = Arc::new(SqliteContributionStore::new(database));
    let transfer = Arc::new(DryRunTransfer::new());
    let ledger = RewardLedger::new(
        Arc::clone(&store),
        config.rewards.policy(),
        PoolRegistry::new(config.rewards.platform_pool),
        transfer.clone(),
    );
    let service = StoryService::new(
        store,
        Arc::new(ledger),
        journal.clone(),
        Arc::new(MemoryContentStorage::new()),
    );
    TestHost {
        _dir: dir,
        config,
        journal,
        transfer,
        service,
    }
}

fn write_events(dir: &Path, name: &str, events: &[LedgerEvent]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for event in events {
        writeln!(file, "{}", serde_json::to_string(event).unwrap()).unwrap();
    }
    path
}

fn root(story_id: u64, contributor: &str, created_at: i64) -> SubmitContributionInput {
    SubmitContributionInput {
        story_id,
        contributor: contributor.into(),
        content_ref: "blake3:00".into(),
        created_at: Some(created_at),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_claims_pay_once() {
    let host = sqlite_host();
    let record = host.service.submit_contribution(root(1, "alice", 10)).unwrap();
    for _ in 0..10 {
        host.service.vote(record.id, true).unwrap();
    }
    let reward = host.service.calculate_reward(record.id, 0).unwrap().reward;
    assert_eq!(reward.amount, 100);

    let service = host.service.clone();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let reward_id = reward.id;
        tasks.push(tokio::task::spawn_blocking(move || {
            service.claim(reward_id, "alice")
        }));
    }

    let mut successes = 0;
    let mut already_claimed = 0;
    for task in tasks {
        match task.await.expect("claim task panicked") {
            Ok(_) => successes += 1,
            Err(CoreError::AlreadyClaimed { .. }) => already_claimed += 1,
            Err(other) => panic!("unexpected claim error: {other}"),
        }
    }
    assert_eq!((successes, already_claimed), (1, 7));
    assert_eq!(host.transfer.payouts().len(), 1);
    assert_eq!(host.service.claimable_amount("alice").unwrap(), 0);

    let claims = host
        .journal
        .load()
        .unwrap()
        .into_iter()
        .filter(|event| matches!(event, LedgerEvent::RewardClaimed { .. }))
        .count();
    assert_eq!(claims, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_votes_survive_in_sqlite() {
    let host = sqlite_host();
    let id = host.service.submit_contribution(root(1, "bob", 10)).unwrap().id;

    let mut tasks = Vec::new();
    for worker in 0..6 {
        let service = host.service.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            for _ in 0..25 {
                service.vote(id, worker % 3 != 0).unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.expect("vote task panicked");
    }

    let stored = host.service.store().get(id).unwrap();
    assert_eq!((stored.upvotes, stored.downvotes), (100, 50));
    assert_eq!(host.service.contributor_stats("bob").unwrap().average_rating, 66);
}

#[test]
fn on_disk_journal_replays_into_identical_state() {
    let host = sqlite_host();
    let service = &host.service;
    service.fund_pool(PoolId::Story(7), 40).unwrap();
    let opening = service.submit_contribution(root(7, "alice", 100)).unwrap();
    let reply = service
        .submit_contribution(SubmitContributionInput {
            parent_id: opening.id,
            ..root(7, "bob", 110)
        })
        .unwrap();
    let branch = service
        .submit_contribution(SubmitContributionInput {
            parent_id: opening.id,
            is_branch: true,
            branch_title: Some("The other door".into()),
            ..root(7, "carol", 105)
        })
        .unwrap();
    service.vote(opening.id, true).unwrap();
    service.vote(opening.id, true).unwrap();
    service.vote(reply.id, true).unwrap();
    service.vote(reply.id, true).unwrap();
    service.vote(reply.id, false).unwrap();
    service
        .set_status(branch.id, ContributionStatus::Approved)
        .unwrap();

    let alice = service.calculate_reward(opening.id, 0).unwrap();
    let bob = service.calculate_reward(reply.id, 0).unwrap();
    assert_eq!(alice.reward.amount, 20);
    assert_eq!(bob.reward.amount, 10);
    let clamped = service.calculate_reward(opening.id, 0).unwrap();
    assert_eq!(clamped.reward.amount, 10);
    assert!(clamped.shortfall.is_some());
    service.claim(alice.reward.id, "alice").unwrap();

    let rebuilt = cli::rebuild(&host.config, host.journal.load().unwrap()).unwrap();
    let forest = rebuilt.story_forest(7).unwrap();
    assert_eq!(forest, service.story_forest(7).unwrap());
    let order: Vec<u64> = forest.iter().map(|node| node.id()).collect();
    assert_eq!(order, vec![opening.id, branch.id, reply.id]);

    for who in ["alice", "bob", "carol"] {
        assert_eq!(
            rebuilt.contributor_stats(who).unwrap(),
            service.contributor_stats(who).unwrap()
        );
        assert_eq!(
            rebuilt.claimable_amount(who).unwrap(),
            service.claimable_amount(who).unwrap()
        );
    }
    assert_eq!(
        rebuilt.ledger().pool_balance(PoolId::Story(7)).unwrap(),
        Some(0)
    );
}

#[test]
fn import_rejects_events_that_do_not_apply() {
    let host = sqlite_host();
    host.service
        .submit_contribution(root(3, "dana", 1))
        .unwrap();
    let before = host.journal.len().unwrap();

    let bad = host.config.paths.base.join("bad.jsonl");
    let mut file = std::fs::File::create(&bad).unwrap();
    writeln!(
        file,
        "{}",
        serde_json::to_string(&LedgerEvent::VoteRecorded {
            contribution_id: 999,
            is_upvote: true,
        })
        .unwrap()
    )
    .unwrap();
    assert!(cli::run_import(&host.config, &bad).is_err());
    assert_eq!(host.journal.len().unwrap(), before);

    let good = host.config.paths.base.join("good.jsonl");
    let mut file = std::fs::File::create(&good).unwrap();
    for event in [
        LedgerEvent::VoteRecorded {
            contribution_id: 1,
            is_upvote: true,
        },
        LedgerEvent::PoolFunded {
            pool: PoolId::Platform,
            amount: 5,
        },
    ] {
        writeln!(file, "{}", serde_json::to_string(&event).unwrap()).unwrap();
    }
    writeln!(file).unwrap();
    assert_eq!(cli::run_import(&host.config, &good).unwrap(), 2);
    assert_eq!(host.journal.len().unwrap(), before + 2);

    let rebuilt = cli::rebuild(&host.config, host.journal.load().unwrap()).unwrap();
    assert_eq!(rebuilt.contributor_stats("dana").unwrap().total_upvotes, 1);
}

#[test]
fn import_rejects_rewards_the_journal_cannot_back() {
    let host = sqlite_host();
    let record = host
        .service
        .submit_contribution(root(3, "dana", 1))
        .unwrap();
    let before = host.journal.len().unwrap();
    let reward = PendingReward {
        id: 1,
        contributor: "dana".into(),
        amount: 1_000_000,
        story_id: 3,
        contribution_id: record.id,
        timestamp: 2,
        claimed: false,
    };

    let unfunded = write_events(
        &host.config.paths.base,
        "unfunded.jsonl",
        &[LedgerEvent::RewardCalculated {
            reward: reward.clone(),
        }],
    );
    let err = cli::run_import(&host.config, &unfunded).unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<CoreError>(),
        Some(CoreError::InvalidReward { id: 1, .. })
    ));

    let misattributed = write_events(
        &host.config.paths.base,
        "misattributed.jsonl",
        &[LedgerEvent::RewardCalculated {
            reward: PendingReward {
                contributor: "mallory".into(),
                amount: 5,
                ..reward.clone()
            },
        }],
    );
    assert!(cli::run_import(&host.config, &misattributed).is_err());

    let dangling = write_events(
        &host.config.paths.base,
        "dangling.jsonl",
        &[LedgerEvent::RewardCalculated {
            reward: PendingReward {
                contribution_id: 404,
                amount: 5,
                ..reward
            },
        }],
    );
    assert!(cli::run_import(&host.config, &dangling).is_err());
    assert_eq!(host.journal.len().unwrap(), before);
}

fn seeded_host() -> TestHost {
    let host = sqlite_host();
    let service = &host.service;
    let opening = service.submit_contribution(root(5, "alice", 100)).unwrap();
    service
        .submit_contribution(SubmitContributionInput {
            parent_id: opening.id,
            is_branch: true,
            branch_title: Some("Upstream".into()),
            ..root(5, "bob", 160)
        })
        .unwrap();
    service.vote(opening.id, true).unwrap();
    service.vote(opening.id, false).unwrap();
    let reward = service.calculate_reward(opening.id, 0).unwrap().reward;
    assert_eq!(reward.amount, 0);
    service.vote(opening.id, true).unwrap();
    let reward = service.calculate_reward(opening.id, 0).unwrap().reward;
    service.claim(reward.id, "alice").unwrap();
    service.calculate_reward(opening.id, 0).unwrap();
    host
}

fn captured(run: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
    let mut out = Vec::new();
    run(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn tree_command_prints_an_outline() {
    let host = seeded_host();
    let text = captured(|out| cli::run_tree(&host.config, 5, false, out));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "#1 alice +2/-1 pending 1970-01-01T00:01:40+00:00",
            "  #2 bob +0/-0 pending 1970-01-01T00:02:40+00:00 [branch: Upstream]",
            "story 5: 2 contributions, 1 roots, 1 branches, depth 1",
        ]
    );

    let empty = captured(|out| cli::run_tree(&host.config, 99, false, out));
    assert_eq!(
        empty,
        "story 99: 0 contributions, 0 roots, 0 branches, depth 0\n"
    );
}

#[test]
fn tree_command_emits_nested_json() {
    let host = seeded_host();
    let text = captured(|out| cli::run_tree(&host.config, 5, true, out));
    let view: serde_json::Value = serde_json::from_str(&text).unwrap();
    let roots = view.as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["id"], 1);
    assert_eq!(roots[0]["contributor"], "alice");
    assert_eq!(roots[0]["level"], 0);
    let children = roots[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["path"], "1.2");
    assert_eq!(children[0]["branch_title"], "Upstream");
    assert!(children[0]["children"].as_array().unwrap().is_empty());
}

#[test]
fn stats_command_reports_claims_and_pending_rewards() {
    let host = seeded_host();
    let text = captured(|out| cli::run_stats(&host.config, "alice", out));
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec![
            "contributor:      alice",
            "contributions:    1",
            "upvotes:          2",
            "average rating:   66%",
            "rewards earned:   10",
            "claimable:        10",
            "last contributed: 1970-01-01T00:01:40+00:00",
        ]
    );

    let nobody = captured(|out| cli::run_stats(&host.config, "nobody", out));
    assert!(nobody.contains("last contributed: never"));
}

#[test]
fn export_round_trips_through_import() {
    let host = seeded_host();
    let text = captured(|out| cli::run_export(&host.config, out));
    let exported: Vec<LedgerEvent> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(exported, host.journal.load().unwrap());
    assert_eq!(
        exported.iter().map(LedgerEvent::kind).collect::<Vec<_>>(),
        vec![
            "contribution_submitted",
            "contribution_submitted",
            "vote_recorded",
            "vote_recorded",
            "reward_calculated",
            "vote_recorded",
            "reward_calculated",
            "reward_claimed",
            "reward_calculated",
        ]
    );

    let fresh = sqlite_host();
    let dump = fresh.config.paths.base.join("dump.jsonl");
    std::fs::write(&dump, &text).unwrap();
    assert_eq!(cli::run_import(&fresh.config, &dump).unwrap(), exported.len());
    let copy = captured(|out| cli::run_export(&fresh.config, out));
    assert_eq!(copy, text);
}
