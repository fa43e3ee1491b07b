use std::sync::Arc;

use plume_cache::{CacheKey, CacheStore, CacheValue, Collection, CommentId, CommentThread, FeedId, LikeStatus, Profile, UserId};
use plume_net::ClientError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::testing::{ChannelBackend, LikeServer, comment, feed, page_of};

fn like_state(store: &CacheStore, key: &CacheKey, id: u64) -> Option<(bool, u32)> {
	store.read(key, |value| value.and_then(|v| v.feed(FeedId(id))).map(|item| (item.liked, item.like_count)))
}

fn comment_count(store: &CacheStore, key: &CacheKey, id: u64) -> Option<u32> {
	store.read(key, |value| value.and_then(|v| v.feed(FeedId(id))).map(|item| item.comment_count))
}

fn thread_ids(store: &CacheStore, feed: u64) -> Vec<i64> {
	store
		.thread(FeedId(feed))
		.map(|thread| thread.iter().map(|c| c.id.0).collect())
		.unwrap_or_default()
}

fn seeded_store() -> CacheStore {
	let store = CacheStore::new();
	store.put(CacheKey::Feed(FeedId(42)), feed(42, 5, false));
	let mut list = Collection::from_page(page_of(&[41, 42, 43], 1, true));
	if let Some(item) = list.get_mut(FeedId(42)) {
		item.like_count = 5;
	}
	store.put(CacheKey::feed_list(), CacheValue::Feeds(list));
	store
}

fn status(liked: bool, like_count: u32) -> LikeStatus {
	LikeStatus { liked, like_count }
}

#[tokio::test]
async fn like_confirmed_keeps_prediction_in_every_copy() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let call = calls.recv().await.expect("request issued");
	assert_eq!(call.op, "like 42");
	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((true, 6)));
	assert_eq!(like_state(&store, &CacheKey::feed_list(), 42), Some((true, 6)));
	assert!(engine.is_pending(GateKey::new(ActionKind::ToggleLike, TargetId::Feed(FeedId(42)))));

	call.ok(status(true, 6));
	let outcome = task.await.expect("joined").expect("committed");
	assert_eq!(outcome, MutationOutcome::Committed(status(true, 6)));
	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((true, 6)));
	assert_eq!(like_state(&store, &CacheKey::feed_list(), 42), Some((true, 6)));
	assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn like_rejected_restores_every_copy() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	calls.recv().await.expect("request issued").fail(ClientError::NetworkFailure("reset".into()));

	let err = task.await.expect("joined").expect_err("rolled back");
	assert_eq!(err, MutationError::Client(ClientError::NetworkFailure("reset".into())));
	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((false, 5)));
	assert_eq!(like_state(&store, &CacheKey::feed_list(), 42), Some((false, 5)));
	assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn server_value_wins_over_prediction() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	calls.recv().await.expect("request issued").ok(status(true, 11));
	task.await.expect("joined").expect("committed");
	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((true, 11)));
	assert_eq!(like_state(&store, &CacheKey::feed_list(), 42), Some((true, 11)));
}

#[tokio::test]
async fn second_toggle_while_pending_is_ignored() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let call = calls.recv().await.expect("request issued");

	let second = engine.toggle_like(FeedId(42)).await.expect("not an error");
	assert!(second.is_ignored());
	assert!(calls.try_recv().is_err(), "ignored call sends nothing");
	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((true, 6)));

	call.ok(status(true, 6));
	task.await.expect("joined").expect("committed");

	// Gate is free again: the next toggle unlikes.
	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let call = calls.recv().await.expect("request issued");
	assert_eq!(call.op, "unlike 42");
	call.ok(status(false, 5));
	task.await.expect("joined").expect("committed");
	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((false, 5)));
}

#[tokio::test]
async fn uncached_item_is_liked_without_prediction() {
	let store = CacheStore::new();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(7)).await }
	});
	let call = calls.recv().await.expect("request issued");
	assert_eq!(call.op, "like 7");
	call.ok(status(true, 1));
	task.await.expect("joined").expect("committed");
	assert!(store.keys_holding_feed(FeedId(7)).is_empty(), "reconcile never creates entries");
}

#[tokio::test]
async fn overlapping_failures_unwind_last_in_first_out() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);
	let key = CacheKey::Feed(FeedId(42));

	let like = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let like_call = calls.recv().await.expect("like issued");
	let add = tokio::spawn({
		let engine = engine.clone();
		async move { engine.add_comment(FeedId(42), UserId(3), "nice", None).await }
	});
	let add_call = calls.recv().await.expect("comment issued");
	assert_eq!(like_state(&store, &key, 42), Some((true, 6)));
	assert_eq!(comment_count(&store, &key, 42), Some(1));

	add_call.fail(ClientError::NetworkFailure("reset".into()));
	add.await.expect("joined").expect_err("rolled back");
	assert_eq!(like_state(&store, &key, 42), Some((true, 6)), "earlier prediction survives");
	assert_eq!(comment_count(&store, &key, 42), Some(0));

	like_call.fail(ClientError::NetworkFailure("reset".into()));
	like.await.expect("joined").expect_err("rolled back");
	assert_eq!(store.feed(FeedId(42)), Some(feed_with(42, 5, false, 0)));
}

#[tokio::test]
async fn earlier_failure_keeps_later_prediction() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);
	let key = CacheKey::Feed(FeedId(42));

	let like = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let like_call = calls.recv().await.expect("like issued");
	let add = tokio::spawn({
		let engine = engine.clone();
		async move { engine.add_comment(FeedId(42), UserId(3), "nice", None).await }
	});
	let add_call = calls.recv().await.expect("comment issued");

	like_call.fail(ClientError::from_status(500, ""));
	like.await.expect("joined").expect_err("rolled back");
	assert_eq!(like_state(&store, &key, 42), Some((false, 5)));
	assert_eq!(comment_count(&store, &key, 42), Some(1), "pending comment prediction kept");

	add_call.ok(comment(900, None));
	add.await.expect("joined").expect("committed");
	assert_eq!(comment_count(&store, &key, 42), Some(1));
}

fn feed_with(id: u64, like_count: u32, liked: bool, comment_count: u32) -> plume_cache::FeedItem {
	let mut item = feed(id, like_count, liked);
	item.comment_count = comment_count;
	item
}

#[tokio::test]
async fn add_comment_confirms_provisional_in_place() {
	let store = seeded_store();
	let thread = CommentThread::from_comments(FeedId(42), [comment(1, None), comment(2, None)]).expect("valid thread");
	store.put(CacheKey::Comments(FeedId(42)), thread);
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.add_comment(FeedId(42), UserId(3), "reply", Some(CommentId(1))).await }
	});
	let call = calls.recv().await.expect("request issued");
	assert_eq!(call.op, "add_comment 42 Some(CommentId(1))");
	assert_eq!(thread_ids(&store, 42), vec![1, 2, -1]);
	assert_eq!(comment_count(&store, &CacheKey::feed_list(), 42), Some(1));

	call.ok(comment(3, Some(1)));
	let confirmed = task.await.expect("joined").expect("committed").committed().expect("not ignored");
	assert_eq!(confirmed.id, CommentId(3));
	assert_eq!(thread_ids(&store, 42), vec![1, 2, 3]);
	assert_eq!(comment_count(&store, &CacheKey::Feed(FeedId(42)), 42), Some(1));
}

#[tokio::test]
async fn reply_to_foreign_parent_is_rejected_before_request() {
	let store = seeded_store();
	store.put(
		CacheKey::Comments(FeedId(42)),
		CommentThread::from_comments(FeedId(42), [comment(1, None)]).expect("valid thread"),
	);
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let err = engine
		.add_comment(FeedId(42), UserId(3), "reply", Some(CommentId(77)))
		.await
		.expect_err("unknown parent");
	assert!(matches!(err, MutationError::Thread(_)));
	let err = engine.add_comment(FeedId(42), UserId(3), "   ", None).await.expect_err("empty");
	assert_eq!(err, MutationError::EmptyComment);
	assert!(calls.try_recv().is_err());
	assert_eq!(thread_ids(&store, 42), vec![1]);
	assert_eq!(comment_count(&store, &CacheKey::Feed(FeedId(42)), 42), Some(0));
}

#[tokio::test]
async fn delete_comment_removes_replies_and_restores_on_failure() {
	let store = CacheStore::new();
	let mut item = feed(42, 0, false);
	item.comment_count = 4;
	store.put(CacheKey::Feed(FeedId(42)), item);
	store.put(
		CacheKey::Comments(FeedId(42)),
		CommentThread::from_comments(FeedId(42), [comment(1, None), comment(2, Some(1)), comment(3, Some(2)), comment(4, None)])
			.expect("valid thread"),
	);
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.delete_comment(FeedId(42), CommentId(1)).await }
	});
	let call = calls.recv().await.expect("request issued");
	assert_eq!(thread_ids(&store, 42), vec![4]);
	assert_eq!(comment_count(&store, &CacheKey::Feed(FeedId(42)), 42), Some(1));

	call.fail(ClientError::from_status(403, ""));
	let err = task.await.expect("joined").expect_err("rolled back");
	assert_eq!(err, MutationError::Client(ClientError::AuthRequired));
	assert_eq!(thread_ids(&store, 42), vec![1, 2, 3, 4]);
	assert_eq!(comment_count(&store, &CacheKey::Feed(FeedId(42)), 42), Some(4));
}

#[tokio::test]
async fn provisional_comments_cannot_be_deleted() {
	let (backend, _calls) = ChannelBackend::new();
	let engine = MutationEngine::new(CacheStore::new(), backend);
	let err = engine.delete_comment(FeedId(1), CommentId(-1)).await.expect_err("provisional");
	assert_eq!(err, MutationError::Provisional(CommentId(-1)));
}

#[tokio::test]
async fn follow_toggle_reconciles_profile() {
	let store = CacheStore::new();
	store.put(
		CacheKey::Profile(UserId(7)),
		Profile {
			id: UserId(7),
			nickname: "kim".into(),
			following: false,
			follower_count: 10,
			following_count: 2,
		},
	);
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_follow(UserId(7)).await }
	});
	let call = calls.recv().await.expect("request issued");
	assert_eq!(call.op, "follow 7");
	assert_eq!(store.profile(UserId(7)).map(|p| (p.following, p.follower_count)), Some((true, 11)));
	call.ok(plume_cache::FollowStatus {
		following: true,
		follower_count: 12,
	});
	task.await.expect("joined").expect("committed");
	assert_eq!(store.profile(UserId(7)).map(|p| (p.following, p.follower_count)), Some((true, 12)));
}

#[tokio::test]
async fn dropped_mutation_rolls_back_and_frees_gate() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let _call = calls.recv().await.expect("request issued");
	task.abort();
	let _ = task.await;

	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((false, 5)));
	assert_eq!(engine.pending_count(), 0);
}

#[tokio::test]
async fn later_reconciliation_is_not_overwritten_by_earlier_one() {
	let store = seeded_store();
	let key = CacheKey::Feed(FeedId(42));
	let targets = vec![key.clone()];

	let mut reconciled = std::collections::HashMap::new();
	store.transaction(|txn| {
		let mut later = Reconciler {
			txn,
			seq: 2,
			targets: &targets,
			reconciled: &mut reconciled,
		};
		assert!(later.overwrite(&key, TargetId::Feed(FeedId(42)), |v| {
			if let Some(item) = v.feed_mut(FeedId(42)) {
				item.apply_like_status(status(true, 9));
			}
		}));
	});
	store.transaction(|txn| {
		let mut earlier = Reconciler {
			txn,
			seq: 1,
			targets: &targets,
			reconciled: &mut reconciled,
		};
		assert!(!earlier.overwrite(&key, TargetId::Feed(FeedId(42)), |v| {
			if let Some(item) = v.feed_mut(FeedId(42)) {
				item.apply_like_status(status(false, 1));
			}
		}));
	});
	assert_eq!(like_state(&store, &key, 42), Some((true, 9)));
}

#[tokio::test]
async fn later_like_on_sibling_row_does_not_block_earlier_reconcile() {
	let store = seeded_store();
	let (backend, mut calls) = ChannelBackend::new();
	let engine = MutationEngine::new(store.clone(), backend);

	let first = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(42)).await }
	});
	let like_42 = calls.recv().await.expect("first request issued");
	let second = tokio::spawn({
		let engine = engine.clone();
		async move { engine.toggle_like(FeedId(43)).await }
	});
	let like_43 = calls.recv().await.expect("second request issued");
	assert_eq!(like_42.op, "like 42");
	assert_eq!(like_43.op, "like 43");

	like_43.ok(status(true, 1));
	second.await.expect("joined").expect("committed");
	like_42.ok(status(true, 10));
	first.await.expect("joined").expect("committed");

	assert_eq!(like_state(&store, &CacheKey::Feed(FeedId(42)), 42), Some((true, 10)));
	assert_eq!(like_state(&store, &CacheKey::feed_list(), 42), Some((true, 10)));
	assert_eq!(like_state(&store, &CacheKey::feed_list(), 43), Some((true, 1)));
	assert_eq!(engine.pending_count(), 0);
}

proptest! {
	#[test]
	fn cache_matches_server_after_every_toggle(
		liked in any::<bool>(),
		like_count in 0u32..3,
		outcomes in proptest::collection::vec(any::<bool>(), 1..12),
	) {
		let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
		let initial = status(liked, like_count);
		let server = LikeServer::new(initial, outcomes.clone());
		let store = CacheStore::new();
		store.put(CacheKey::Feed(FeedId(1)), feed(1, like_count, liked));
		let engine = MutationEngine::new(store.clone(), Arc::clone(&server) as Arc<dyn plume_net::FeedBackend>);

		let mut expected = initial;
		for ok in outcomes {
			let result = runtime.block_on(engine.toggle_like(FeedId(1)));
			prop_assert_eq!(result.is_ok(), ok);
			if ok {
				expected = *server.state.lock();
			}
			let cached = store.feed(FeedId(1)).map(|item| status(item.liked, item.like_count));
			prop_assert_eq!(cached, Some(expected));
		}
	}
}
