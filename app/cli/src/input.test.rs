use super::*;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;

fn queue_over(bytes: &'static [u8], mode: InputMode, window_ms: u64) -> InputQueue<BufReader<&'static [u8]>> {
    InputQueue::from_reader(BufReader::new(bytes), mode, Duration::from_millis(window_ms))
}

#[test]
fn test_parse_plain_text() {
    assert_eq!(parse_line("hello"), Some("hello".to_string()));
    assert_eq!(parse_line("  spaced  "), Some("spaced".to_string()));
}

#[test]
fn test_parse_blank_ignored() {
    assert_eq!(parse_line(""), None);
    assert_eq!(parse_line("   "), None);
}

#[test]
fn test_parse_json_message() {
    assert_eq!(
        parse_line("{\"message\": \"hi there\"}"),
        Some("hi there".to_string())
    );
    assert_eq!(parse_line("{\"other\": 1}"), None);
    assert_eq!(parse_line("{\"message\": \"\"}"), None);
}

#[test]
fn test_parse_malformed_json_treated_as_text() {
    assert_eq!(parse_line("{not json"), Some("{not json".to_string()));
}

#[tokio::test]
async fn test_literal_mode_one_prompt_per_line() {
    let mut queue = queue_over(b"first\n\nsecond\n", InputMode::Literal, 50);
    assert_eq!(queue.next_prompt().await, Some("first".to_string()));
    assert_eq!(queue.next_prompt().await, Some("second".to_string()));
    assert_eq!(queue.next_prompt().await, None);
    assert_eq!(queue.next_prompt().await, None);
}

#[tokio::test]
async fn test_coalesce_merges_lines_already_buffered() {
    // Both lines are available immediately, well inside the window.
    let mut queue = queue_over(b"line one\nline two\n", InputMode::Coalesce, 50);
    assert_eq!(queue.next_prompt().await, Some("line one\nline two".to_string()));
    assert_eq!(queue.next_prompt().await, None);
}

#[tokio::test]
async fn test_coalesce_window_splits_spaced_lines() {
    // A duplex pipe lets the test control arrival timing.
    let (mut writer, reader) = tokio::io::duplex(256);
    let mut queue = InputQueue::from_reader(
        BufReader::new(reader),
        InputMode::Coalesce,
        Duration::from_millis(30),
    );

    let feeder = tokio::spawn(async move {
        writer.write_all(b"first\n").await.unwrap();
        // Longer than the window: the queue must emit "first" alone.
        tokio::time::sleep(Duration::from_millis(120)).await;
        writer.write_all(b"second\n").await.unwrap();
        drop(writer);
    });

    assert_eq!(queue.next_prompt().await, Some("first".to_string()));
    assert_eq!(queue.next_prompt().await, Some("second".to_string()));
    assert_eq!(queue.next_prompt().await, None);
    feeder.await.unwrap();
}

#[tokio::test]
async fn test_coalesce_two_quick_lines_one_prompt() {
    let (mut writer, reader) = tokio::io::duplex(256);
    let mut queue = InputQueue::from_reader(
        BufReader::new(reader),
        InputMode::Coalesce,
        Duration::from_millis(80),
    );

    let feeder = tokio::spawn(async move {
        writer.write_all(b"a\n").await.unwrap();
        // Inside the window: merged into the same prompt.
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.write_all(b"b\n").await.unwrap();
        drop(writer);
    });

    assert_eq!(queue.next_prompt().await, Some("a\nb".to_string()));
    feeder.await.unwrap();
}

#[tokio::test]
async fn test_json_lines_in_coalesce_mode() {
    let mut queue = queue_over(
        b"{\"message\": \"part one\"}\n{\"message\": \"part two\"}\n",
        InputMode::Coalesce,
        50,
    );
    assert_eq!(
        queue.next_prompt().await,
        Some("part one\npart two".to_string())
    );
}

#[tokio::test]
async fn test_blank_lines_ignored_everywhere() {
    let mut queue = queue_over(b"\n\n\nreal\n\n", InputMode::Coalesce, 20);
    assert_eq!(queue.next_prompt().await, Some("real".to_string()));
    assert_eq!(queue.next_prompt().await, None);
}

#[tokio::test]
async fn test_empty_input_is_no_prompts() {
    let mut queue = queue_over(b"", InputMode::Coalesce, 20);
    assert_eq!(queue.next_prompt().await, None);
}
