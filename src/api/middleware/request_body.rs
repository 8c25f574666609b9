//! 请求体缓冲
//!
//! handler 运行前按上限读取请求体。读到的帧、读取时遇到的错误以及未读完的剩余部分
//! 都通过 `ReplayBody` 原样交还给 handler；超过上限或读取失败时审计里的请求体为 "N/A"。

use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};

use axum::body::{Body, Bytes};
use futures::future::poll_fn;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use serde_json::Value;

/// 先重放已读帧，再重放读取错误，最后继续原请求体
pub struct ReplayBody {
    buffered: VecDeque<Frame<Bytes>>,
    error: Option<axum::Error>,
    rest: Option<Body>,
}

impl ReplayBody {
    fn buffered_len(&self) -> u64 {
        self.buffered
            .iter()
            .filter_map(Frame::data_ref)
            .map(|data| data.len() as u64)
            .sum()
    }
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(frame) = this.buffered.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if let Some(err) = this.error.take() {
            return Poll::Ready(Some(Err(err)));
        }
        match this.rest.as_mut() {
            Some(rest) => Pin::new(rest).poll_frame(cx),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.buffered.is_empty()
            && self.error.is_none()
            && self.rest.as_ref().map_or(true, |rest| rest.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = self.buffered_len();
        match (&self.rest, &self.error) {
            (None, None) => SizeHint::with_exact(buffered),
            (Some(rest), None) => {
                let inner = rest.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(buffered + inner.lower());
                if let Some(upper) = inner.upper() {
                    hint.set_upper(buffered + upper);
                }
                hint
            }
            (_, Some(_)) => {
                let mut hint = SizeHint::new();
                hint.set_lower(buffered);
                hint
            }
        }
    }
}

fn replay(buffered: VecDeque<Frame<Bytes>>, error: Option<axum::Error>, rest: Option<Body>) -> Body {
    Body::new(ReplayBody {
        buffered,
        error,
        rest,
    })
}

fn collect_text(buffered: &VecDeque<Frame<Bytes>>) -> Option<Value> {
    let mut bytes = Vec::new();
    for data in buffered.iter().filter_map(Frame::data_ref) {
        bytes.extend_from_slice(data);
    }
    (!bytes.is_empty()).then(|| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

/// 读取不超过 `limit` 字节的请求体，返回审计用的文本和交给 handler 的请求体
pub async fn buffer_request_body(mut body: Body, limit: usize) -> (Option<Value>, Body) {
    if body.is_end_stream() {
        return (None, body);
    }

    // 声明的长度已经超限，直接透传
    if body.size_hint().lower() > limit as u64 {
        tracing::debug!(limit, "Request body exceeds audit capture limit, not buffered");
        return (None, body);
    }

    let mut buffered = VecDeque::new();
    let mut read = 0usize;
    loop {
        match poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
            Some(Ok(frame)) => {
                read += frame.data_ref().map_or(0, |data| data.len());
                buffered.push_back(frame);
                if read > limit {
                    tracing::debug!(limit, "Request body exceeds audit capture limit, not logged");
                    return (None, replay(buffered, None, Some(body)));
                }
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Request body failed while buffering for audit");
                return (None, replay(buffered, Some(err), None));
            }
            None => break,
        }
    }

    let captured = collect_text(&buffered);
    (captured, replay(buffered, None, None))
}
