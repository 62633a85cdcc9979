//! # Reference Audio Endpoint
//!
//! `GET /api/audio/{word_id}` streams the recording registered for a word.
//!
//! ## Responses:
//! - `200`: raw WAV bytes, `Content-Type: audio/wav`, attachment named after
//!   the stored filename
//! - `404`: unknown word, no recording registered, or file missing on disk
//! - `400`: stored filename does not resolve to a file inside the audio
//!   directory (body message is always "Invalid audio file path")

use crate::audio::AUDIO_CONTENT_TYPE;
use crate::{error::AppResult, state::AppState};
use actix_web::body::SizedStream;
use actix_web::http::header::{
    Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue,
};
use actix_web::{web, HttpResponse};
use tokio_util::io::ReaderStream;

pub async fn stream_audio(
    state: web::Data<AppState>,
    word_id: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let audio = state.audio.open(word_id.into_inner()).await?;

    let disposition = attachment(&audio.filename);

    // The file handle lives inside the stream; if the client goes away the
    // body is dropped and the file is closed.
    let body = SizedStream::new(audio.len, ReaderStream::new(audio.file));

    Ok(HttpResponse::Ok()
        .content_type(AUDIO_CONTENT_TYPE)
        .insert_header(disposition)
        .body(body))
}

/// `Content-Disposition: attachment` carrying the stored filename. Non-ASCII
/// names also get an RFC 5987 `filename*` parameter.
fn attachment(filename: &str) -> ContentDisposition {
    let mut parameters = vec![DispositionParam::Filename(filename.to_string())];

    if !filename.is_ascii() {
        parameters.push(DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext("UTF-8".to_string()),
            language_tag: None,
            value: filename.as_bytes().to_vec(),
        }));
    }

    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters,
    }
}
