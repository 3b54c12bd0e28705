//! Stream frames and the event fragments parsed out of them
//!
//! A frame's content is an XHTML document holding zero or more `<li>` event
//! fragments. Parsing is atomic: if the markup is malformed, or any `<li>` has
//! no `<a>` link, the whole frame is rejected and none of its fragments are
//! exposed.

use rws_api::xml;
use rws_api::{EventFragment, ProtocolError};
use std::fmt;
use xmltree::Element;

/// FIN bit of the frame flags
pub const FLAG_FIN: u32 = 0x80;
/// Mask selecting the opcode from the frame flags
pub const OPCODE_MASK: u32 = 0x0F;

const OP_CONTINUATION: u32 = 0x0;
const OP_TEXT: u32 = 0x1;
const OP_BINARY: u32 = 0x2;
const OP_CLOSE: u32 = 0x8;
const OP_PING: u32 = 0x9;
const OP_PONG: u32 = 0xA;

/// WebSocket opcode carried in the low nibble of the frame flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOpcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Undefined,
}

impl FrameOpcode {
    pub fn from_flags(flags: u32) -> Self {
        match flags & OPCODE_MASK {
            OP_CONTINUATION => FrameOpcode::Continuation,
            OP_TEXT => FrameOpcode::Text,
            OP_BINARY => FrameOpcode::Binary,
            OP_CLOSE => FrameOpcode::Close,
            OP_PING => FrameOpcode::Ping,
            OP_PONG => FrameOpcode::Pong,
            _ => FrameOpcode::Undefined,
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            FrameOpcode::Continuation => OP_CONTINUATION,
            FrameOpcode::Text => OP_TEXT,
            FrameOpcode::Binary => OP_BINARY,
            FrameOpcode::Close => OP_CLOSE,
            FrameOpcode::Ping => OP_PING,
            FrameOpcode::Pong => OP_PONG,
            FrameOpcode::Undefined => OPCODE_MASK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameOpcode::Continuation => "FRAME_OP_CONT",
            FrameOpcode::Text => "FRAME_OP_TEXT",
            FrameOpcode::Binary => "FRAME_OP_BINARY",
            FrameOpcode::Close => "FRAME_OP_CLOSE",
            FrameOpcode::Ping => "FRAME_OP_PING",
            FrameOpcode::Pong => "FRAME_OP_PONG",
            FrameOpcode::Undefined => "FRAME_OP_UNDEFINED",
        }
    }

    /// Whether frames with this opcode carry event markup
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            FrameOpcode::Continuation | FrameOpcode::Text | FrameOpcode::Binary
        )
    }
}

impl fmt::Display for FrameOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One frame received from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketFrame {
    pub flags: u32,
    pub content: String,
}

impl WebSocketFrame {
    pub fn new(flags: u32, content: impl Into<String>) -> Self {
        Self {
            flags,
            content: content.into(),
        }
    }

    /// A final text frame
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(FLAG_FIN | OP_TEXT, content)
    }

    pub fn close() -> Self {
        Self::new(FLAG_FIN | OP_CLOSE, String::new())
    }

    pub fn opcode(&self) -> FrameOpcode {
        FrameOpcode::from_flags(self.flags)
    }

    pub fn is_final(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }
}

/// A validated frame document
#[derive(Debug, Clone)]
pub struct ParsedFrame {
    root: Option<Element>,
    fragment_count: usize,
}

impl ParsedFrame {
    /// Parse and validate frame content
    ///
    /// Blank content is a frame with no fragments.
    pub fn parse(content: &str) -> Result<Self, ProtocolError> {
        if content.trim().is_empty() {
            return Ok(Self {
                root: None,
                fragment_count: 0,
            });
        }

        let root = xml::parse_xhtml(content)?;
        let items = xml::find_elements_by_name(&root, "li");
        for item in &items {
            EventFragment::from_element(item)?;
        }
        let fragment_count = items.len();

        Ok(Self {
            root: Some(root),
            fragment_count,
        })
    }

    /// Fragments in document order
    pub fn fragments(&self) -> Fragments<'_> {
        Fragments {
            stack: self.root.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fragment_count
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_count == 0
    }
}

/// Lazy pre-order walk over the `<li>` elements of a [`ParsedFrame`]
#[derive(Debug)]
pub struct Fragments<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = EventFragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(element) = self.stack.pop() {
            let children: Vec<&'a Element> = xml::child_elements(element).collect();
            self.stack.extend(children.into_iter().rev());

            if element.name == "li" {
                // Links were checked when the frame was parsed
                if let Ok(fragment) = EventFragment::from_element(element) {
                    return Some(fragment);
                }
            }
        }
        None
    }
}
