//! 进度推送（SSE）
//!
//! 把 `ProgressSubscriber` 转换为 `data: <json>\n\n` 帧序列：
//! - 空闲超过心跳间隔时发送心跳帧（不消耗任何事件）
//! - 发送终止事件后结束；通道已关闭时直接结束

use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tracing::debug;

use crate::infrastructure::ProgressSubscriber;
use crate::models::WireFrame;

/// SSE 帧流
pub type FrameStream = BoxStream<'static, Result<String, serde_json::Error>>;

/// 进度推送器
#[derive(Debug, Clone, Copy)]
pub struct StreamPublisher {
    heartbeat_interval: Duration,
}

impl StreamPublisher {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self { heartbeat_interval }
    }

    /// 生成帧流
    pub fn frames(&self, subscriber: ProgressSubscriber) -> FrameStream {
        let heartbeat = self.heartbeat_interval;

        stream::unfold(Some(subscriber), move |state| async move {
            let mut subscriber = state?;
            let task_id = subscriber.task_id();

            match subscriber.next_within(heartbeat).await {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    let frame = WireFrame::event(&task_id, &event).to_sse();
                    if terminal {
                        debug!("[任务 {}] 已推送终止事件，关闭 SSE", task_id);
                    }
                    Some((frame, (!terminal).then_some(subscriber)))
                }
                Ok(None) => Some((WireFrame::heartbeat().to_sse(), Some(subscriber))),
                Err(e) => {
                    debug!("[任务 {}] {}", task_id, e);
                    None
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ProgressChannel;
    use crate::models::{ProcessingStep, ProgressEvent, TaskId, UnitProgress};

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_then_events_then_end() {
        let channel = ProgressChannel::new(TaskId::new(), 8);
        let mut frames = StreamPublisher::new(Duration::from_secs(30)).frames(channel.attach().unwrap());

        // 空闲 → 心跳
        let first = frames.next().await.unwrap().unwrap();
        assert!(matches!(
            WireFrame::from_sse(&first).unwrap(),
            WireFrame::Heartbeat(_)
        ));

        channel.publish(ProgressEvent::status_update(
            ProcessingStep::OcrProcessing,
            40.0,
            Some(2),
            5,
        ));
        channel.publish(ProgressEvent::Completed(UnitProgress::default()));

        let second = frames.next().await.unwrap().unwrap();
        assert!(second.contains("\"status\":\"processing\""));
        let third = frames.next().await.unwrap().unwrap();
        assert!(third.contains("\"status\":\"completed\""));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_published_before_attach_is_delivered() {
        let channel = ProgressChannel::new(TaskId::new(), 8);
        channel.publish(ProgressEvent::cancelled("User requested cancellation"));

        let frames: Vec<_> = StreamPublisher::new(Duration::from_secs(30))
            .frames(channel.attach().unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert!(frame.contains("\"cancellationReason\":\"User requested cancellation\""));
    }
}
