//! 业务能力层
//!
//! 描述"我能做什么"，每个能力都是一个 trait，具体实现位于 `clients/`：
//! - `Recognizer` - OCR 识别
//! - `Enhancer` - LLM 增强
//! - `PageRenderer` - PDF 分页渲染

pub mod enhancer;
pub mod page_renderer;
pub mod recognizer;

pub use enhancer::{EnhanceInput, Enhancer};
pub use page_renderer::PageRenderer;
pub use recognizer::{Recognition, RecognizeOptions, Recognizer, TextStream};
