//! Sound clips through HTML audio elements
//!
//! Browsers refuse playback until a user gesture has happened, so the
//! manager is created lazily on the first interaction and [`AudioManager::unlock`]
//! reports whether the page actually got audio.

use std::collections::HashMap;
use std::future::Future;

use thiserror::Error;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlAudioElement;

use crate::settings::Settings;
use crate::surface::{AudioFeedback, SoundClip};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("could not create audio element for {path}: {reason}")]
    Load { path: &'static str, reason: String },
    #[error("clip {0:?} was never loaded")]
    Missing(SoundClip),
    #[error("playback rejected: {0}")]
    Playback(String),
}

impl AudioError {
    fn playback(value: JsValue) -> Self {
        AudioError::Playback(format!("{:?}", value))
    }
}

/// Preloaded clips, one element each
pub struct AudioManager {
    clips: HashMap<SoundClip, HtmlAudioElement>,
    volume: f32,
}

impl AudioManager {
    pub fn new(settings: &Settings) -> Result<Self, AudioError> {
        let volume = settings.effective_volume();
        let mut clips = HashMap::new();
        for clip in SoundClip::ALL {
            let element = HtmlAudioElement::new_with_src(clip.path()).map_err(|e| AudioError::Load {
                path: clip.path(),
                reason: format!("{:?}", e),
            })?;
            element.set_preload("auto");
            element.set_volume(volume as f64);
            clips.insert(clip, element);
        }
        log::info!("Loaded {} sound clips at volume {:.2}", clips.len(), volume);
        Ok(Self { clips, volume })
    }

    /// Play one clip muted so later plays are allowed.
    /// Resolves to an error when the browser still blocks audio.
    pub fn unlock(&self) -> impl Future<Output = Result<(), AudioError>> + 'static {
        // play() has to start inside the gesture handler, not when polled
        let started = self
            .clips
            .get(&SoundClip::Press)
            .cloned()
            .ok_or(AudioError::Missing(SoundClip::Press))
            .and_then(|element| {
                element.set_muted(true);
                let promise = element.play().map_err(AudioError::playback)?;
                Ok((element, promise))
            });

        async move {
            let (element, promise) = started?;
            let result = JsFuture::from(promise).await;

            let _ = element.pause();
            element.set_current_time(0.0);
            element.set_muted(false);
            result.map(|_| ()).map_err(AudioError::playback)
        }
    }

    fn try_play(&self, clip: SoundClip) -> Result<(), AudioError> {
        let element = self.clips.get(&clip).ok_or(AudioError::Missing(clip))?;
        // Restart clips that are still playing
        element.set_current_time(0.0);
        let promise = element.play().map_err(AudioError::playback)?;
        // Autoplay refusals arrive as a rejected promise
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                log::warn!("{} ({:?})", AudioError::playback(e), clip);
            }
        });
        Ok(())
    }
}

impl AudioFeedback for AudioManager {
    fn play(&mut self, clip: SoundClip) {
        if self.volume <= 0.0 {
            return;
        }
        if let Err(e) = self.try_play(clip) {
            log::warn!("{}", e);
        }
    }
}
