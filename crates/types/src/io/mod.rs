pub mod html;
pub mod trace_text;
pub mod xml;
