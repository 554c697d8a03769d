//! 并发一致性测试
//!
//! 相向滑动与并发建会话在多线程运行时下反复竞争，验证边沿只触发一次、
//! 用户对只对应一个会话。

mod support;

use std::sync::Arc;

use domain::{NotificationType, SwipeDecision};
use futures::future::join_all;
use support::{test_app, user};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_likes_produce_exactly_one_new_match() {
    let app = test_app();

    for _ in 0..200 {
        let (a, b) = (user(), user());
        let left = {
            let matches = app.services.matches.clone();
            tokio::spawn(async move { matches.swipe(a, b, SwipeDecision::Like).await })
        };
        let right = {
            let matches = app.services.matches.clone();
            tokio::spawn(async move { matches.swipe(b, a, SwipeDecision::Like).await })
        };

        let left = left.await.expect("join").expect("swipe a");
        let right = right.await.expect("join").expect("swipe b");

        assert_eq!(
            [left.is_new_match, right.is_new_match]
                .iter()
                .filter(|hit| **hit)
                .count(),
            1,
            "exactly one caller observes the match edge"
        );
        assert!(left.mutual || right.mutual);

        let record = app
            .services
            .ledger
            .record(a, b)
            .await
            .expect("lookup")
            .expect("record exists");
        assert!(record.mutual);
        assert_eq!(record.version, 2);

        // 每个用户恰好收到一条匹配通知
        for participant in [a, b] {
            let feed = app.services.dispatcher.feed(participant, None).await.expect("feed");
            assert_eq!(feed.len(), 1);
            assert_eq!(feed[0].kind, NotificationType::Match);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_converges_on_one_conversation() {
    let app = test_app();
    let (a, b) = (user(), user());

    let calls = (0..32).map(|i| {
        let directory = Arc::clone(&app.services.directory);
        tokio::spawn(async move {
            if i % 2 == 0 {
                directory.get_or_create_conversation(a, b).await
            } else {
                directory.get_or_create_conversation(b, a).await
            }
        })
    });

    let ids: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.expect("join").expect("get or create"))
        .collect();

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    let listed = app
        .services
        .directory
        .list_for_user(a, 10)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ids[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_get_distinct_sequence_numbers() {
    let app = test_app();
    let (a, b) = (user(), user());
    let conversation = app
        .services
        .directory
        .get_or_create_conversation(a, b)
        .await
        .expect("conversation");

    let sends = (0..20).map(|i| {
        let chat = app.services.chat.clone();
        let sender = if i % 2 == 0 { a } else { b };
        tokio::spawn(async move {
            chat.send_message(
                conversation,
                sender,
                application::MessageInput::text(format!("message {i}")),
            )
            .await
        })
    });
    for joined in join_all(sends).await {
        joined.expect("join").expect("send");
    }

    let history = app
        .services
        .chat
        .history(conversation, a, None, None)
        .await
        .expect("history");
    let seqs: Vec<_> = history.iter().map(|message| message.seq).collect();
    assert_eq!(seqs, (1..=20).collect::<Vec<i64>>());
}
