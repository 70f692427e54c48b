//! Window events to viewer actions

use glfw::{Action, Key, MouseButton, WindowEvent};

/// What the viewer should do in response to an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    /// Close the window and shut down
    Close,
    /// Orbit the camera by a cursor delta in pixels
    Rotate {
        /// Horizontal movement
        dx: f32,
        /// Vertical movement
        dy: f32,
    },
    /// Zoom by scroll steps
    Zoom(f32),
    /// The framebuffer changed size
    Resize(u32, u32),
}

/// Right-button drag tracking
#[derive(Debug, Default)]
pub struct InputState {
    drag_origin: Option<(f64, f64)>,
}

impl InputState {
    /// Map one event; `cursor` is the cursor position when the event is handled
    pub fn handle(&mut self, event: &WindowEvent, cursor: (f64, f64)) -> Option<InputAction> {
        match *event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) => Some(InputAction::Close),
            WindowEvent::MouseButton(MouseButton::Button2, Action::Press, _) => {
                self.drag_origin = Some(cursor);
                None
            }
            WindowEvent::MouseButton(MouseButton::Button2, Action::Release, _) => {
                self.drag_origin = None;
                None
            }
            WindowEvent::CursorPos(x, y) => {
                let (last_x, last_y) = self.drag_origin?;
                self.drag_origin = Some((x, y));
                Some(InputAction::Rotate {
                    dx: (x - last_x) as f32,
                    dy: (y - last_y) as f32,
                })
            }
            WindowEvent::Scroll(_, y) => Some(InputAction::Zoom(y as f32)),
            WindowEvent::FramebufferSize(width, height) => {
                Some(InputAction::Resize(width.max(0) as u32, height.max(0) as u32))
            }
            _ => None,
        }
    }

    /// Whether a right-button drag is in progress
    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfw::Modifiers;

    #[test]
    fn test_escape_closes() {
        let mut input = InputState::default();
        let press = WindowEvent::Key(Key::Escape, 0, Action::Press, Modifiers::empty());
        let release = WindowEvent::Key(Key::Escape, 0, Action::Release, Modifiers::empty());
        assert_eq!(input.handle(&press, (0.0, 0.0)), Some(InputAction::Close));
        assert_eq!(input.handle(&release, (0.0, 0.0)), None);
    }

    #[test]
    fn test_cursor_only_rotates_while_dragging() {
        let mut input = InputState::default();
        assert_eq!(input.handle(&WindowEvent::CursorPos(10.0, 10.0), (10.0, 10.0)), None);

        let press = WindowEvent::MouseButton(MouseButton::Button2, Action::Press, Modifiers::empty());
        input.handle(&press, (100.0, 50.0));
        assert!(input.is_dragging());

        assert_eq!(
            input.handle(&WindowEvent::CursorPos(110.0, 45.0), (110.0, 45.0)),
            Some(InputAction::Rotate { dx: 10.0, dy: -5.0 })
        );
        assert_eq!(
            input.handle(&WindowEvent::CursorPos(111.0, 45.0), (111.0, 45.0)),
            Some(InputAction::Rotate { dx: 1.0, dy: 0.0 })
        );

        let release = WindowEvent::MouseButton(MouseButton::Button2, Action::Release, Modifiers::empty());
        input.handle(&release, (111.0, 45.0));
        assert!(!input.is_dragging());
        assert_eq!(input.handle(&WindowEvent::CursorPos(200.0, 200.0), (200.0, 200.0)), None);
    }

    #[test]
    fn test_left_button_does_not_drag() {
        let mut input = InputState::default();
        let press = WindowEvent::MouseButton(MouseButton::Button1, Action::Press, Modifiers::empty());
        input.handle(&press, (0.0, 0.0));
        assert!(!input.is_dragging());
    }

    #[test]
    fn test_scroll_and_resize() {
        let mut input = InputState::default();
        assert_eq!(
            input.handle(&WindowEvent::Scroll(0.0, -2.0), (0.0, 0.0)),
            Some(InputAction::Zoom(-2.0))
        );
        assert_eq!(
            input.handle(&WindowEvent::FramebufferSize(1024, 768), (0.0, 0.0)),
            Some(InputAction::Resize(1024, 768))
        );
        assert_eq!(
            input.handle(&WindowEvent::FramebufferSize(0, 0), (0.0, 0.0)),
            Some(InputAction::Resize(0, 0))
        );
    }
}
