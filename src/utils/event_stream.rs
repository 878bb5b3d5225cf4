//! SSE 字节流按行切分
//!
//! 转发路径上对上游 `text/event-stream` 响应做旁路解析：原始字节原样回写
//! 客户端，同时把完整的文本行交给 token 解析器。跨 chunk 的半行会被缓存，
//! 直到下一个换行符出现。

use bytes::{Buf, BytesMut};

/// 行切分缓冲：`push` 喂入原始字节，返回其中完整的行（去掉行尾 `\n`/`\r\n`）。
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: BytesMut,
}

impl SseLineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// 喂入一个数据块，返回其中所有完整行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line = self.buf.split_to(pos + 1);
            // 去掉行尾换行与可选的回车
            line.truncate(line.len() - 1);
            if line.ends_with(b"\r") {
                line.truncate(line.len() - 1);
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// 流结束时取出残余的最后一行（上游未以换行收尾的场景）
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split_to(self.buf.remaining());
        let mut line = rest.as_ref();
        if line.ends_with(b"\r") {
            line = &line[..line.len() - 1];
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }
}
