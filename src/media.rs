use crate::error::{Error, Result};
use crate::logger::log;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Какие дорожки запрашиваем у платформы
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Локальный медиапоток: дорожки, которые отдаются в каждый звонок.
/// Пока поток не получен, ни входящие, ни исходящие звонки не обслуживаются.
#[derive(Debug)]
pub struct LocalMedia {
    audio_track: Option<Arc<TrackLocalStaticSample>>,
    video_track: Option<Arc<TrackLocalStaticSample>>,
    stream_id: String,
}

impl LocalMedia {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn has_audio(&self) -> bool {
        self.audio_track.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video_track.is_some()
    }

    /// Все дорожки потока для добавления в соединение
    pub fn tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.audio_track
            .iter()
            .chain(self.video_track.iter())
            .cloned()
            .collect()
    }

    /// Кадр видео от захвата
    pub async fn write_video(&self, data: Bytes, duration: Duration) -> Result<()> {
        let track = self.video_track.as_ref().ok_or(Error::MediaNotReady)?;
        track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Порция аудио от захвата
    pub async fn write_audio(&self, data: Bytes, duration: Duration) -> Result<()> {
        let track = self.audio_track.as_ref().ok_or(Error::MediaNotReady)?;
        track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

/// Бэкенд захвата: платформа либо выдаёт поток, либо отказывает.
/// Отказ — обычная ошибка, а не падение процесса.
pub trait MediaBackend: Send + Sync {
    fn open(&self, constraints: &MediaConstraints) -> Result<LocalMedia>;
}

/// Бэкенд по умолчанию: sample-дорожки (VP8/Opus), в которые приложение
/// само заливает кадры из своего источника захвата
pub struct SampleBackend;

impl MediaBackend for SampleBackend {
    fn open(&self, constraints: &MediaConstraints) -> Result<LocalMedia> {
        if !constraints.audio && !constraints.video {
            return Err(Error::MediaDenied(
                "at least one of audio/video must be requested".into(),
            ));
        }

        let stream_id = format!("peercall-{}", crate::utils::random_id());

        let video_track = constraints.video.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id.clone(),
            ))
        });

        let audio_track = constraints.audio.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            ))
        });

        log(&format!(
            "local media opened: audio={} video={} stream={}",
            constraints.audio, constraints.video, stream_id
        ));

        Ok(LocalMedia {
            audio_track,
            video_track,
            stream_id,
        })
    }
}
