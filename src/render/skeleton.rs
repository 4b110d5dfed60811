use image::Rgba;

use super::canvas::Canvas;
use crate::pose::{KeypointIndex, Pose};

/// 骨格の接続定義 (開始キーポイント, 終了キーポイント)
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 16] = [
    // 顔
    (KeypointIndex::LeftEar, KeypointIndex::LeftEye),
    (KeypointIndex::LeftEye, KeypointIndex::Nose),
    (KeypointIndex::Nose, KeypointIndex::RightEye),
    (KeypointIndex::RightEye, KeypointIndex::RightEar),
    // 上半身
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    (KeypointIndex::RightElbow, KeypointIndex::RightWrist),
    // 胴体
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
    // 下半身
    (KeypointIndex::LeftHip, KeypointIndex::LeftKnee),
    (KeypointIndex::LeftKnee, KeypointIndex::LeftAnkle),
    (KeypointIndex::RightHip, KeypointIndex::RightKnee),
    (KeypointIndex::RightKnee, KeypointIndex::RightAnkle),
];

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);
pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 骨格線の色
pub const BONE_COLOR: Rgba<u8> = Rgba([0, 191, 255, 255]);

const KEYPOINT_RADIUS: i32 = 4;

/// 部位ごとのキーポイント色
pub fn keypoint_color(index: KeypointIndex) -> Rgba<u8> {
    use KeypointIndex::*;
    match index {
        LeftShoulder | RightShoulder | LeftHip | RightHip => RED,
        LeftElbow | RightElbow | LeftKnee | RightKnee => YELLOW,
        LeftWrist | RightWrist | LeftAnkle | RightAnkle => GREEN,
        _ => WHITE,
    }
}

/// 閾値以上のキーポイントと、その両端が閾値以上の骨を描く
pub fn draw_skeleton(canvas: &mut Canvas, pose: &Pose, threshold: f32) {
    for (start_idx, end_idx) in SKELETON_CONNECTIONS.iter() {
        let start = pose.get(*start_idx);
        let end = pose.get(*end_idx);

        if start.is_valid(threshold) && end.is_valid(threshold) {
            let (x1, y1) = start.to_pixel();
            let (x2, y2) = end.to_pixel();
            canvas.draw_line(x1, y1, x2, y2, BONE_COLOR);
        }
    }

    for (index, kp) in pose.iter() {
        if kp.is_valid(threshold) {
            let (px, py) = kp.to_pixel();
            canvas.fill_circle(px, py, KEYPOINT_RADIUS, keypoint_color(index));
        }
    }
}
