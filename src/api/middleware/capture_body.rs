//! 响应体捕获
//!
//! `CaptureBody` 包装原响应体：每个数据帧原样交给下游，需要记录时同时追加到缓冲，
//! 流结束时补齐响应时间戳和完整响应体，然后发出结束阶段的审计记录。
//! 流在结束前被丢弃（客户端断开等）时不会产生记录。

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::{Body, Bytes};
use chrono::Utc;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::{
    audit::{
        helper::audit_response,
        transaction::{RequestInfo, ResponseInfo},
    },
    config::AuditOptions,
};

/// 等待响应体结束的审计上下文
pub struct PendingAudit {
    pub request: RequestInfo,
    pub response: ResponseInfo,
    pub options: Arc<AuditOptions>,
}

impl PendingAudit {
    /// `captured` 为 `None` 表示响应体没有保留（不记录或超限）
    pub fn complete(mut self, captured: Option<&[u8]>) {
        self.response.timestamp = Some(Utc::now());
        self.response.body_str = captured.map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        audit_response(&mut self.request, &mut self.response, &self.options);
    }
}

pub struct CaptureBody {
    inner: Body,
    captured: Vec<u8>,
    /// `None` 时只转发不保留
    capture_limit: Option<usize>,
    overflowed: bool,
    pending: Option<PendingAudit>,
}

impl CaptureBody {
    pub fn new(inner: Body, pending: PendingAudit, capture_limit: Option<usize>) -> Self {
        Self {
            inner,
            captured: Vec::new(),
            capture_limit,
            overflowed: false,
            pending: Some(pending),
        }
    }

    /// 已经结束的响应体不会再被轮询，直接完成审计并原样返回
    pub fn wrap(inner: Body, pending: PendingAudit, capture_limit: Option<usize>) -> Body {
        if inner.is_end_stream() {
            pending.complete(capture_limit.map(|_| &[][..]));
            return inner;
        }

        Body::new(Self::new(inner, pending, capture_limit))
    }

    /// 当前保留的字节数
    pub fn captured_len(&self) -> usize {
        self.captured.len()
    }

    fn record(&mut self, data: &Bytes) {
        let Some(limit) = self.capture_limit else {
            return;
        };
        if self.overflowed {
            return;
        }

        if self.captured.len() + data.len() > limit {
            tracing::debug!(limit, "Response body exceeds audit capture limit, not logged");
            self.overflowed = true;
            self.captured = Vec::new();
        } else {
            self.captured.extend_from_slice(data);
        }
    }

    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            let captured = std::mem::take(&mut self.captured);
            let keep = self.capture_limit.is_some() && !self.overflowed;
            pending.complete(keep.then_some(&captured[..]));
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                if this.inner.is_end_stream() {
                    this.finish();
                }
            }
            Poll::Ready(None) => this.finish(),
            Poll::Ready(Some(Err(err))) => {
                tracing::debug!(error = %err, "Response body failed, audit record dropped");
                this.pending = None;
            }
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use futures::{future::poll_fn, stream};

    use super::*;
    use crate::{config::DEFAULT_MAX_CAPTURE_BYTES, infrastructure::sink::MemorySink};

    const CAPTURE_ALL: Option<usize> = Some(DEFAULT_MAX_CAPTURE_BYTES);

    fn pending(sink: &MemorySink) -> PendingAudit {
        PendingAudit {
            request: RequestInfo {
                url: Some("/stream".into()),
                timestamp: Some(Utc::now()),
                ..Default::default()
            },
            response: ResponseInfo {
                status_code: Some(200),
                ..Default::default()
            },
            options: AuditOptions::default()
                .with_sink(Arc::new(sink.clone()))
                .shared(),
        }
    }

    #[tokio::test]
    async fn test_streamed_chunks_are_forwarded_and_captured() {
        let sink = MemorySink::new();
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("ab"), Ok("cd")];
        let body = CaptureBody::wrap(Body::from_stream(stream::iter(chunks)), pending(&sink), CAPTURE_ALL);

        let forwarded = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&forwarded[..], b"abcd");

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload["response"]["body"], "abcd");
        assert_eq!(entries[0].payload["stage"], "end");
    }

    #[tokio::test]
    async fn test_full_body_completes_once() {
        let sink = MemorySink::new();
        let body = CaptureBody::wrap(Body::from("hello"), pending(&sink), CAPTURE_ALL);

        let forwarded = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&forwarded[..], b"hello");
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.entries()[0].payload["response"]["body"], "hello");
    }

    #[tokio::test]
    async fn test_empty_body_audits_immediately() {
        let sink = MemorySink::new();
        let body = CaptureBody::wrap(Body::empty(), pending(&sink), CAPTURE_ALL);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.entries()[0].payload["response"]["body"], "N/A");

        let forwarded = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert!(forwarded.is_empty());
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_body_emits_nothing() {
        let sink = MemorySink::new();
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("ab")];
        let body = CaptureBody::wrap(Body::from_stream(stream::iter(chunks)), pending(&sink), CAPTURE_ALL);

        drop(body);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_failed_body_emits_nothing() {
        let sink = MemorySink::new();
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
            Ok("ab"),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")),
        ];
        let body = CaptureBody::wrap(Body::from_stream(stream::iter(chunks)), pending(&sink), CAPTURE_ALL);

        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_uncaptured_body_keeps_no_bytes() {
        let sink = MemorySink::new();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            (0..8).map(|_| Ok(vec![b'x'; 1024 * 1024])).collect();
        let mut body = CaptureBody::new(Body::from_stream(stream::iter(chunks)), pending(&sink), None);

        let mut forwarded = 0;
        while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
            forwarded += frame.unwrap().into_data().unwrap().len();
            assert_eq!(body.captured_len(), 0);
        }

        assert_eq!(forwarded, 8 * 1024 * 1024);
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload["response"]["body"], "N/A");
        assert_eq!(entries[0].payload["response"]["status_code"], 200);
    }

    #[tokio::test]
    async fn test_body_over_capture_limit_is_forwarded_but_not_logged() {
        let sink = MemorySink::new();
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("ab"), Ok("cd"), Ok("ef")];
        let mut body =
            CaptureBody::new(Body::from_stream(stream::iter(chunks)), pending(&sink), Some(3));

        let mut forwarded = Vec::new();
        while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
            forwarded.extend_from_slice(&frame.unwrap().into_data().unwrap());
            assert!(body.captured_len() <= 3);
        }

        assert_eq!(forwarded, b"abcdef");
        assert_eq!(sink.entries()[0].payload["response"]["body"], "N/A");
    }
}
