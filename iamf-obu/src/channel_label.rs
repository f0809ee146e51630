// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The closed set of channel labels a substream's samples can carry, and the
//! pure functions that map loudspeaker layouts to the label sets they need.

use crate::audio_element::LoudspeakerLayout;

/// A single logical channel. `Demixed` wraps any label reconstructed by a
/// demixer rather than decoded directly, so original and reconstructed
/// channels of the same name can coexist in one `LabelSamples` map.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLabel {
    Mono,
    L2,
    R2,
    L3,
    R3,
    Centre,
    L5,
    R5,
    Ls5,
    Rs5,
    L7,
    R7,
    Lss7,
    Rss7,
    Lrs7,
    Rrs7,
    Ltf2,
    Rtf2,
    Ltf3,
    Rtf3,
    Ltf4,
    Rtf4,
    Ltb4,
    Rtb4,
    Lfe,
    Ambisonics(u8),
    Demixed(Box<ChannelLabel>),
}

impl ChannelLabel {
    /// Wraps `self` as the demixer-reconstructed variant of the same label.
    /// Idempotent: demixing an already-demixed label returns it unchanged.
    pub fn demixed(&self) -> ChannelLabel {
        match self {
            ChannelLabel::Demixed(_) => self.clone(),
            other => ChannelLabel::Demixed(Box::new(other.clone())),
        }
    }

    pub fn is_demixed(&self) -> bool {
        matches!(self, ChannelLabel::Demixed(_))
    }

    /// The non-demixed label this one names, stripping one layer of
    /// `Demixed` if present.
    pub fn base(&self) -> &ChannelLabel {
        match self {
            ChannelLabel::Demixed(inner) => inner,
            other => other,
        }
    }
}

/// The base-channel-group labels carried by a layer whose loudspeaker layout
/// is the *first* layer of a scalable config (IAMF §3.7.2 base channel
/// group), ordered coupled-pairs-first, then center, then LFE.
pub fn base_channel_group_labels(layout: LoudspeakerLayout) -> Vec<ChannelLabel> {
    use ChannelLabel::*;
    use LoudspeakerLayout::*;
    match layout {
        Mono => vec![Mono],
        Stereo => vec![L2, R2],
        Surround5_1 => vec![L5, R5, Ls5, Rs5, Centre, Lfe],
        Surround5_1_2 => vec![L5, R5, Ls5, Rs5, Ltf4, Rtf4, Centre, Lfe],
        Surround5_1_4 => vec![L5, R5, Ls5, Rs5, Ltf4, Rtf4, Ltb4, Rtb4, Centre, Lfe],
        Surround7_1 => vec![L7, R7, Lss7, Rss7, Lrs7, Rrs7, Centre, Lfe],
        Surround7_1_2 => vec![L7, R7, Lss7, Rss7, Lrs7, Rrs7, Ltf4, Rtf4, Centre, Lfe],
        Surround7_1_4 => vec![L7, R7, Lss7, Rss7, Lrs7, Rrs7, Ltf4, Rtf4, Ltb4, Rtb4, Centre, Lfe],
        Surround3_1_2 => vec![L3, R3, Ltf3, Rtf3, Centre, Lfe],
        Binaural => vec![L2, R2],
        Expanded(_) => Vec::new(),
    }
}

/// `L7`/`R7` are a straight rename of `L5`/`R5` (IAMF §3.7.2, `S7→S5` is the
/// identity `L5 = L7; R5 = R7`, not a mix), so a lower layer's `L5` already
/// covers an upper layer's `L7` even though the two labels are spelled
/// differently. Every other chain step is a genuine mix and contributes no
/// such alias.
fn canonical(label: &ChannelLabel) -> ChannelLabel {
    match label {
        ChannelLabel::L7 => ChannelLabel::L5,
        ChannelLabel::R7 => ChannelLabel::R5,
        other => other.clone(),
    }
}

/// Labels that, when `layout` is introduced as a non-first (demixed channel
/// group) layer, are never carried on their own substream because the
/// demixer algebra of IAMF §3.7.2 reconstructs them from a coupled sibling
/// that *is* live plus the lower layer's already-known channels:
/// `Mono→Stereo` gives a live `L2` and a derived `R2`
/// (`R2 = 2·Mono − L2`); `Stereo→3.1.2`/`Stereo→5.1` derive `L3`/`R3` or
/// `L5`/`R5` from `L2`/`R2` plus the newly-live centre channel
/// (`L3 = L2 − 0.707·C`); `5.1→7.1` derives `Lrs7`/`Rrs7` from the newly-live
/// `Lss7`/`Rss7` plus the lower layer's `Ls5`/`Rs5`
/// (`Lrs7 = (Ls5 − α·Lss7) / β`).
fn demixed_only_labels(layout: LoudspeakerLayout) -> &'static [ChannelLabel] {
    use ChannelLabel::*;
    use LoudspeakerLayout::*;
    match layout {
        Stereo => &[R2],
        Surround3_1_2 => &[L3, R3],
        Surround5_1 => &[L5, R5],
        Surround7_1 => &[Lrs7, Rrs7],
        _ => &[],
    }
}

/// The labels that a layer *adds on top of* the labels already carried by
/// lower layers, using the demixed-channel-group naming (IAMF §3.7.2). A
/// label is marked `Demixed` — and so carries no substream of its own —
/// when it is either a literal repeat (up to the `L7`/`R7` rename) of a
/// lower layer's label, or one of `layout`'s `demixed_only_labels`: the
/// channel the demixer algebra reconstructs rather than transmits when this
/// layer is layered on top of an existing one.
pub fn labels_to_reconstruct(
    layout: LoudspeakerLayout,
    lower_layer_labels: &[ChannelLabel],
) -> Vec<ChannelLabel> {
    let lower_canonical: Vec<ChannelLabel> = lower_layer_labels.iter().map(canonical).collect();
    let demixed_only = demixed_only_labels(layout);
    let all = base_channel_group_labels(layout);
    all.into_iter()
        .map(|label| {
            if lower_canonical.contains(&canonical(&label)) || demixed_only.contains(&label) {
                label.demixed()
            } else {
                label
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demixed_is_idempotent() {
        let once = ChannelLabel::L5.demixed();
        let twice = once.demixed();
        assert_eq!(once, twice);
    }

    #[test]
    fn base_strips_demixed_wrapper() {
        let demixed = ChannelLabel::Rs5.demixed();
        assert_eq!(demixed.base(), &ChannelLabel::Rs5);
    }

    #[test]
    fn base_channel_group_for_5_1() {
        let labels = base_channel_group_labels(LoudspeakerLayout::Surround5_1);
        assert_eq!(
            labels,
            vec![
                ChannelLabel::L5,
                ChannelLabel::R5,
                ChannelLabel::Ls5,
                ChannelLabel::Rs5,
                ChannelLabel::Centre,
                ChannelLabel::Lfe,
            ]
        );
    }

    #[test]
    fn labels_to_reconstruct_marks_shared_labels_as_demixed() {
        let lower = base_channel_group_labels(LoudspeakerLayout::Surround5_1);
        let upper = labels_to_reconstruct(LoudspeakerLayout::Surround7_1, &lower);
        // Centre and Lfe are literal repeats; L7/R7 alias L5/R5 (same
        // channel, different name) so they're already known too; Lrs7/Rrs7
        // are demixed-only per the S7->S5 algebra. Only Lss7/Rss7 are new
        // and carry a substream of their own.
        assert!(upper.contains(&ChannelLabel::Centre.demixed()));
        assert!(upper.contains(&ChannelLabel::Lfe.demixed()));
        assert!(upper.contains(&ChannelLabel::Lrs7.demixed()));
        assert!(upper.contains(&ChannelLabel::Rrs7.demixed()));
        assert!(upper.contains(&ChannelLabel::L7.demixed()));
        assert!(upper.contains(&ChannelLabel::R7.demixed()));
        assert!(upper.contains(&ChannelLabel::Lss7));
        assert!(upper.contains(&ChannelLabel::Rss7));
        assert_eq!(upper.iter().filter(|l| !l.is_demixed()).count(), 2);
    }

    #[test]
    fn labels_to_reconstruct_mono_to_stereo_has_one_live_label() {
        let lower = base_channel_group_labels(LoudspeakerLayout::Mono);
        let upper = labels_to_reconstruct(LoudspeakerLayout::Stereo, &lower);
        assert_eq!(upper, vec![ChannelLabel::L2, ChannelLabel::R2.demixed()]);
        assert_eq!(upper.iter().filter(|l| !l.is_demixed()).count(), 1);
    }
}
