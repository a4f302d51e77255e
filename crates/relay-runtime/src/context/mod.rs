//! Message context builders
//!
//! Convert canonical [`Message`](crate::types::Message)s into the request
//! shapes of the chat completions and responses APIs.

mod image;
mod messages;
mod responses;

pub use image::{
    ImageFile, ImageSource, convert_image_url_to_file, image_url_to_base64, inline_image_url, parse_data_uri,
};
pub use messages::convert_openai_messages;
pub use responses::convert_response_inputs;
