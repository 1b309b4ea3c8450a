use super::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;

fn byte_stream(
    chunks: Vec<&'static [u8]>,
) -> impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> {
    futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
}

async fn collect_frames(chunks: Vec<&'static [u8]>) -> Vec<SseFrame> {
    let mut stream = SseFrameStream::new(byte_stream(chunks));
    let mut frames = Vec::new();
    while let Some(frame) = stream.next().await {
        frames.push(frame.unwrap());
    }
    frames
}

#[tokio::test]
async fn test_single_frame() {
    let frames = collect_frames(vec![b"data: {\"x\":1}\n\n"]).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "{\"x\":1}");
}

#[tokio::test]
async fn test_multiple_frames_one_chunk() {
    let frames = collect_frames(vec![b"data: a\n\ndata: b\n\ndata: [DONE]\n\n"]).await;
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].data, "a");
    assert_eq!(frames[1].data, "b");
    assert!(frames[2].is_done());
}

#[tokio::test]
async fn test_single_byte_chunks_reassemble() {
    // One byte per read must still produce correctly assembled events.
    let payload: &'static [u8] = b"data: {\"delta\":\"hi\"}\n\ndata: [DONE]\n\n";
    let chunks: Vec<&'static [u8]> = (0..payload.len()).map(|i| &payload[i..i + 1]).collect();
    let frames = collect_frames(chunks).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data, "{\"delta\":\"hi\"}");
    assert!(frames[1].is_done());
}

#[tokio::test]
async fn test_multi_line_data_joined_with_newline() {
    let frames = collect_frames(vec![b"data: line1\ndata: line2\n\n"]).await;
    assert_eq!(frames[0].data, "line1\nline2");
}

#[tokio::test]
async fn test_comments_and_unknown_fields_ignored() {
    let frames = collect_frames(vec![b": keepalive\nid: 7\nretry: 100\ndata: x\n\n"]).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "x");
}

#[tokio::test]
async fn test_event_field_captured() {
    let frames = collect_frames(vec![b"event: ping\ndata: {}\n\n"]).await;
    assert_eq!(frames[0].event.as_deref(), Some("ping"));
}

#[tokio::test]
async fn test_crlf_line_endings() {
    let frames = collect_frames(vec![b"data: a\r\n\r\ndata: b\r\n\r\n"]).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data, "a");
    assert_eq!(frames[1].data, "b");
}

#[tokio::test]
async fn test_crlf_split_across_chunks() {
    let frames = collect_frames(vec![b"data: a\r", b"\n\r", b"\ndata: b\r\n\r\n"]).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data, "a");
}

#[tokio::test]
async fn test_unterminated_final_frame_flushed_on_close() {
    let frames = collect_frames(vec![b"data: tail"]).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, "tail");
}

#[tokio::test]
async fn test_blank_input_produces_nothing() {
    let frames = collect_frames(vec![b"\n\n\n"]).await;
    assert!(frames.is_empty());
}

#[test]
fn test_preview_truncates_at_char_boundary() {
    let ascii = "a".repeat(300);
    assert_eq!(preview(&ascii).len(), PREVIEW_LIMIT);

    // Multi-byte characters straddling the limit must not split.
    let wide = "é".repeat(150); // 2 bytes each, 300 bytes total
    let p = preview(&wide);
    assert!(p.len() <= PREVIEW_LIMIT);
    assert!(p.chars().all(|c| c == 'é'));

    assert_eq!(preview("short"), "short");
}
