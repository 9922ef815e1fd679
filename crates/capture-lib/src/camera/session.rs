use log::{debug, trace};

use super::backend::{AudioDecoding, DecodedFrame, MediaInput, Packet, VideoDecoding};
use super::delivery::OutputFormat;
use super::error::{EngineError, ReadFailure};
use super::negotiate::DecoderCandidate;
use super::selection::StreamSelection;

type ConversionOf<I> = <<I as MediaInput>::Video as VideoDecoding>::Conversion;

/// Everything one successful open produced.
///
/// Fields are released in dependency order: conversion, audio decoder,
/// video decoder, then the input they all read from.
pub(crate) struct Session<I: MediaInput> {
    generation: u64,
    selection: StreamSelection,
    candidate: DecoderCandidate,
    conversion: Option<ConversionOf<I>>,
    audio: Option<I::Audio>,
    video: Option<I::Video>,
    input: Option<I>,
}

impl<I: MediaInput> Session<I> {
    pub(crate) fn new(
        generation: u64,
        selection: StreamSelection,
        candidate: DecoderCandidate,
        conversion: ConversionOf<I>,
        audio: Option<I::Audio>,
        video: I::Video,
        input: I,
    ) -> Self {
        Self {
            generation,
            selection,
            candidate,
            conversion: Some(conversion),
            audio,
            video: Some(video),
            input: Some(input),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn selection(&self) -> &StreamSelection {
        &self.selection
    }

    pub(crate) fn candidate(&self) -> DecoderCandidate {
        self.candidate
    }

    pub(crate) fn read_packet(&mut self) -> Result<Packet, ReadFailure> {
        let input = self.input.as_mut().ok_or(ReadFailure::EndOfStream)?;
        let mut packet = input.read_packet()?;
        packet.generation = self.generation;
        Ok(packet)
    }

    pub(crate) fn decode(
        &mut self,
        packet: &Packet,
        output: &OutputFormat,
        dst: &mut [u8],
    ) -> Result<Option<DecodedFrame>, EngineError> {
        if packet.generation != self.generation {
            debug!(
                "Discarding packet from session {} (current {})",
                packet.generation, self.generation
            );
            return Ok(None);
        }

        if packet.stream_index == self.selection.video_index() {
            let (Some(video), Some(conversion)) = (self.video.as_mut(), self.conversion.as_mut())
            else {
                return Err(EngineError::NotReady);
            };
            return video.decode_into(packet, conversion, output, dst);
        }

        if Some(packet.stream_index) == self.selection.audio_index() {
            if let Some(audio) = self.audio.as_mut() {
                let samples = audio.decode(packet)?;
                trace!("Decoded {} audio samples", samples);
            }
        }
        Ok(None)
    }

    /// Frees every handle. Safe to call more than once.
    pub(crate) fn release(&mut self) {
        if self.conversion.take().is_some() {
            trace!("Released conversion context");
        }
        if self.audio.take().is_some() {
            trace!("Released audio decoder");
        }
        if self.video.take().is_some() {
            trace!("Released video decoder");
        }
        if self.input.take().is_some() {
            trace!("Released input for session {}", self.generation);
        }
    }
}

impl<I: MediaInput> Drop for Session<I> {
    fn drop(&mut self) {
        self.release();
    }
}
