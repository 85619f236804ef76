use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::RenderError;

/// One planned output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub index: usize,
    pub image_path: PathBuf,
    pub voice_path: PathBuf,
    /// File stem of whichever input side is plural. Not de-duplicated: two
    /// inputs with the same stem render to the same file, last write wins.
    pub output_name: String,
}

/// How voice tracks are matched to images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStrategy {
    /// A single voice track narrates each image in turn. Also used, with the
    /// first voice track only, when both sides have several entries.
    OneToMany,
    /// Every voice track is rendered over the single image.
    ManyToOne,
    OneToOne,
}

impl PairingStrategy {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::OneToMany => "one voice track, many images: one video per image, named after the image",
            Self::ManyToOne => "many voice tracks, one image: one video per voice track, named after the voice track",
            Self::OneToOne => "one voice track, one image: a single video",
        }
    }
}

/// Resolved batch plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub strategy: PairingStrategy,
    pub jobs: Vec<JobSpec>,
    /// Voice tracks dropped because both sides had more than one entry.
    pub ignored_voices: usize,
}

fn output_name(path: &Path, index: usize) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("output_{}", index + 1))
}

fn image_jobs(voice: &Path, images: &[PathBuf]) -> Vec<JobSpec> {
    images
        .iter()
        .enumerate()
        .map(|(index, image)| JobSpec {
            index,
            image_path: image.clone(),
            voice_path: voice.to_path_buf(),
            output_name: output_name(image, index),
        })
        .collect()
}

/// Choose a strategy from the input counts and expand it into jobs, in input
/// order.
pub fn plan(voices: &[PathBuf], images: &[PathBuf]) -> Result<Pairing, RenderError> {
    if voices.is_empty() {
        return Err(RenderError::InvalidInput("no voice tracks given".into()));
    }
    if images.is_empty() {
        return Err(RenderError::InvalidInput("no images given".into()));
    }

    let pairing = match (voices.len(), images.len()) {
        (1, 1) => Pairing {
            strategy: PairingStrategy::OneToOne,
            jobs: image_jobs(&voices[0], images),
            ignored_voices: 0,
        },
        (1, _) => Pairing {
            strategy: PairingStrategy::OneToMany,
            jobs: image_jobs(&voices[0], images),
            ignored_voices: 0,
        },
        (_, 1) => Pairing {
            strategy: PairingStrategy::ManyToOne,
            jobs: voices
                .iter()
                .enumerate()
                .map(|(index, voice)| JobSpec {
                    index,
                    image_path: images[0].clone(),
                    voice_path: voice.clone(),
                    output_name: output_name(voice, index),
                })
                .collect(),
            ignored_voices: 0,
        },
        (n, _) => Pairing {
            strategy: PairingStrategy::OneToMany,
            jobs: image_jobs(&voices[0], images),
            ignored_voices: n - 1,
        },
    };

    Ok(pairing)
}

/// Jobs only; see [`plan`].
pub fn resolve(voices: &[PathBuf], images: &[PathBuf]) -> Result<Vec<JobSpec>, RenderError> {
    plan(voices, images).map(|p| p.jobs)
}
