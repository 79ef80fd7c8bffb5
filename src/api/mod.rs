pub mod dream;
pub mod elevenlabs;
pub mod gemini;
pub mod tts;
