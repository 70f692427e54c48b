//! Texture upload planning without a device

use ash::vk;
use vk_renderer::render::vulkan::image::mip_levels;
use vk_renderer::render::vulkan::texture::MipStep;
use vk_renderer::render::vulkan::{LayoutTransition, MipChainPlan};

fn final_layout(steps: &[MipStep]) -> Option<vk::ImageLayout> {
    steps.iter().rev().find_map(|step| match step {
        MipStep::Transition { new, .. } => Some(*new),
        _ => None,
    })
}

#[test]
fn test_mip_cap_of_one_on_512_square() {
    let plan = MipChainPlan::new(512, 512, Some(1));

    assert_eq!(plan.levels(), 1);
    assert!(plan.blits().is_empty());

    let steps = plan.steps();
    assert!(!steps.iter().any(|step| matches!(step, MipStep::Blit(_))));
    assert_eq!(steps.iter().filter(|step| matches!(step, MipStep::CopyBase)).count(), 1);
    assert_eq!(final_layout(&steps), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
}

#[test]
fn test_uncapped_512_square_generates_full_chain() {
    let plan = MipChainPlan::new(512, 512, None);

    assert_eq!(plan.levels(), 10);
    let blits = plan.blits();
    assert_eq!(blits.len(), 9);
    assert_eq!(blits[0].src_extent, (512, 512));
    assert_eq!(blits[0].dst_extent, (256, 256));
    assert_eq!(blits[8].dst_extent, (1, 1));
    assert_eq!(final_layout(&plan.steps()), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
}

#[test]
fn test_level_count_formula_and_cap() {
    for (width, height) in [(1u32, 1u32), (2, 1), (640, 480), (1024, 3), (4096, 4096)] {
        let natural = 32 - width.max(height).leading_zeros();
        assert_eq!(mip_levels(width, height, None), natural);
        for cap in 1..=12 {
            assert_eq!(mip_levels(width, height, Some(cap)), cap.min(natural));
        }
    }
}

#[test]
fn test_every_planned_barrier_has_masks() {
    for cap in [None, Some(1), Some(3)] {
        for step in MipChainPlan::new(300, 200, cap).steps() {
            if let MipStep::Transition { old, new, .. } = step {
                assert!(
                    LayoutTransition::new(old, new).is_ok(),
                    "no barrier masks for {old:?} -> {new:?}"
                );
            }
        }
    }
}
