//! Swapchain rebuilds and allocation failures on a real device
//!
//! Needs a Vulkan driver, a display and compiled shaders: `cargo test -- --ignored`.

use std::path::PathBuf;

use ash::vk;
use vk_renderer::config::{ModelConfig, ViewerConfig};
use vk_renderer::render::vulkan::{Buffer, VulkanContext, VulkanError, VulkanRenderer, Window};

fn workspace_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").join(relative)
}

fn renderer_config() -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.render.validation = false;
    config.shaders.vertex = workspace_path("target/shaders/scene.vert.spv");
    config.shaders.fragment = workspace_path("target/shaders/scene.frag.spv");
    config.models = vec![ModelConfig {
        mesh: workspace_path("resources/models/cube.obj"),
        texture: workspace_path("resources/textures/checker.png"),
        position: [0.0; 3],
        scale: [1.0; 3],
    }];
    config
}

#[test]
#[ignore = "requires a Vulkan device, a display and compiled shaders"]
fn test_rebuilding_twice_keeps_target_set_consistent() {
    let config = renderer_config();
    let mut window = Window::new_hidden("rebuild", 320, 240).unwrap();
    let mut renderer = VulkanRenderer::new(&mut window, &config).unwrap();

    let initial = renderer.target_set().image_count();
    assert!(initial > 0);
    assert!(renderer.target_set().is_consistent());

    for _ in 0..2 {
        assert!(renderer.recreate_swapchain().unwrap());
        assert!(renderer.target_set().is_consistent());
        assert_eq!(renderer.target_set().image_count(), initial);
    }

    renderer.wait_idle().unwrap();
}

#[test]
#[ignore = "requires a Vulkan device and a display"]
fn test_buffer_without_matching_memory_type_fails_cleanly() {
    let mut window = Window::new_hidden("allocation", 64, 64).unwrap();
    let context = VulkanContext::new(&mut window, "allocation", false, false).unwrap();

    // No memory type may be both protected and host visible
    let result = Buffer::new(
        &context,
        256,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        vk::MemoryPropertyFlags::PROTECTED | vk::MemoryPropertyFlags::HOST_VISIBLE,
    );
    assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));

    context.wait_idle().unwrap();
}
