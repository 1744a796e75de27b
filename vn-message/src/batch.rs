//! # Batch 模块
//!
//! 分页规划：计算当前消息框剩余高度能容纳多少行。

use crate::layout::Line;

/// 计算一页能显示的行数
///
/// 逐行累加 `height + line_spacing`，超过 `box_height - current_y` 即停止。
/// 结果钳制在 `1..=lines.len()`：单行超高时仍显示一行（被裁剪），
/// 不会产生零行的页。空输入返回 1。
pub fn calculate_max_lines(
    lines: &[Line],
    current_y: f32,
    box_height: f32,
    line_spacing: f32,
) -> usize {
    let available = box_height - current_y;
    let mut total = 0.0;
    let mut count = 0;

    for line in lines {
        total += line.height + line_spacing;
        if total > available {
            break;
        }
        count += 1;
    }

    count.clamp(1, lines.len().max(1))
}

/// 是否需要分页
pub fn is_batched(line_count: usize, max_lines: usize) -> bool {
    line_count > max_lines
}
