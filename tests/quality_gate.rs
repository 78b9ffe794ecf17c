//! Property tests for the capture quality gate.

use bytes::Bytes;
use proptest::prelude::*;

use dermascan::types::{RawImage, MIN_CAPTURE_HEIGHT, MIN_CAPTURE_WIDTH};
use dermascan::QualityGate;

fn solid_image(width: u32, height: u32, gray: u8) -> RawImage {
    let pixels = vec![gray; width as usize * height as usize * 3];
    RawImage::from_rgb8(width, height, Bytes::from(pixels)).unwrap()
}

proptest! {
    // Keep image areas small enough that cases stay cheap; the gate itself
    // samples a bounded number of pixels anyway.
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_undersized_image_is_rejected(
        width in 1u32..MIN_CAPTURE_WIDTH,
        height in 1u32..64u32,
        gray in 0u8..=255u8,
    ) {
        let gate = QualityGate::new();
        let report = gate.evaluate(&solid_image(width, height, gray)).unwrap();
        prop_assert!(!report.submittable());
        prop_assert!(report.warning.is_some());
        prop_assert!(report.face_region.is_none());
    }

    #[test]
    fn short_images_are_rejected_regardless_of_width(
        width in MIN_CAPTURE_WIDTH..=2 * MIN_CAPTURE_WIDTH,
        height in 1u32..MIN_CAPTURE_HEIGHT / 8,
        gray in 0u8..=255u8,
    ) {
        let gate = QualityGate::new();
        let report = gate.evaluate(&solid_image(width, height, gray)).unwrap();
        prop_assert!(!report.submittable());
    }

    #[test]
    fn mid_range_brightness_is_always_accepted(gray in 60u8..=230u8) {
        let gate = QualityGate::new();
        let report = gate
            .evaluate(&solid_image(MIN_CAPTURE_WIDTH, MIN_CAPTURE_HEIGHT, gray))
            .unwrap();
        prop_assert!(report.submittable());
        prop_assert!(report.warning.is_none());
        prop_assert!(report.face_region.is_some());
    }

    #[test]
    fn dark_frames_are_hard_rejected(gray in 0u8..=40u8) {
        let gate = QualityGate::new();
        let report = gate
            .evaluate(&solid_image(MIN_CAPTURE_WIDTH, MIN_CAPTURE_HEIGHT, gray))
            .unwrap();
        prop_assert!(!report.submittable());
        prop_assert!(report.warning.as_deref().unwrap().contains("too dark"));
    }

    #[test]
    fn overbright_frames_pass_but_warn(gray in 245u8..=255u8) {
        let gate = QualityGate::new();
        let report = gate
            .evaluate(&solid_image(MIN_CAPTURE_WIDTH, MIN_CAPTURE_HEIGHT, gray))
            .unwrap();
        prop_assert!(report.submittable());
        prop_assert!(report.warning.as_deref().unwrap().contains("too bright"));
        prop_assert!(report.confidence < 0.85);
    }

    #[test]
    fn face_region_stays_inside_the_image(
        width in MIN_CAPTURE_WIDTH..=1920u32,
        height in MIN_CAPTURE_HEIGHT..=1080u32,
    ) {
        let gate = QualityGate::new();
        let report = gate.evaluate(&solid_image(width, height, 128)).unwrap();
        let region = report.face_region.unwrap();
        prop_assert!(region.x + region.width <= width);
        prop_assert!(region.y + region.height <= height);
        prop_assert!(region.width > 0 && region.height > 0);
    }
}
