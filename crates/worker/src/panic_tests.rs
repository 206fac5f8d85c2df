use super::join_error_panic_message;

#[tokio::test]
async fn panic_message_from_literal() {
	let handle = tokio::spawn(async { panic!("catalog scan exploded") });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("join error should be a panic");
	assert_eq!(msg, "catalog scan exploded");
}

#[tokio::test]
async fn panic_message_from_formatted_string() {
	let oid = 16384u32;
	let handle = tokio::spawn(async move { panic!("lost relation {oid}") });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("join error should be a panic");
	assert_eq!(msg, "lost relation 16384");
}

#[tokio::test]
async fn aborted_task_has_no_panic_message() {
	let handle = tokio::spawn(std::future::pending::<()>());
	handle.abort();
	let err = handle.await.unwrap_err();
	assert!(join_error_panic_message(err).is_none());
}
