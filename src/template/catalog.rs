//! Built-in collage layouts used when an event has no custom template.
//!
//! Geometries are fixed pixel values; every layout leaves a margin between
//! frames so the default borders do not collide.

use super::{Canvas, Color, Frame, Styling, Template};

fn frame(x: u32, y: u32, width: u32, height: u32) -> Frame {
    Frame {
        x,
        y,
        width,
        height,
        frame_index: 0,
    }
}

fn layout(
    name: &str,
    description: &str,
    canvas_width: u32,
    canvas_height: u32,
    background_color: &str,
    frames: Vec<Frame>,
    spacing: u32,
    border_width: u32,
) -> Template {
    Template::from_parts(
        name,
        description,
        Canvas {
            width: canvas_width,
            height: canvas_height,
            background_color: Color::parse(background_color).expect("valid catalog color"),
            background_image: None,
        },
        frames,
        Styling {
            spacing,
            border_width,
            border_color: Color::WHITE,
        },
    )
    .expect("valid catalog layout")
}

/// All built-in layouts, in catalog order
pub fn builtin_templates() -> Vec<Template> {
    vec![
        layout(
            "2 Fotos Vertical",
            "Two photos stacked vertically",
            1200,
            1800,
            "#2C3E50",
            vec![frame(100, 100, 1000, 750), frame(100, 950, 1000, 750)],
            20,
            10,
        ),
        layout(
            "2 Fotos Horizontal",
            "Two photos side by side",
            2400,
            1200,
            "#34495E",
            vec![frame(100, 225, 1000, 750), frame(1300, 225, 1000, 750)],
            20,
            10,
        ),
        layout(
            "4 Fotos Grid",
            "Four photos in a 2x2 grid",
            2000,
            2000,
            "#1ABC9C",
            vec![
                frame(100, 100, 850, 850),
                frame(1050, 100, 850, 850),
                frame(100, 1050, 850, 850),
                frame(1050, 1050, 850, 850),
            ],
            20,
            8,
        ),
        layout(
            "4 Fotos Tira",
            "Four photos in a vertical strip",
            800,
            2400,
            "#E74C3C",
            vec![
                frame(100, 100, 600, 450),
                frame(100, 650, 600, 450),
                frame(100, 1200, 600, 450),
                frame(100, 1750, 600, 450),
            ],
            15,
            5,
        ),
        layout(
            "6 Fotos Grid",
            "Six photos in a 3x2 grid",
            2400,
            1800,
            "#9B59B6",
            vec![
                frame(100, 100, 650, 650),
                frame(850, 100, 650, 650),
                frame(1600, 100, 650, 650),
                frame(100, 850, 650, 650),
                frame(850, 850, 650, 650),
                frame(1600, 850, 650, 650),
            ],
            15,
            8,
        ),
        layout(
            "6 Fotos Tira Doble",
            "Six photos in two vertical columns",
            1600,
            2400,
            "#3498DB",
            vec![
                frame(100, 100, 600, 600),
                frame(100, 800, 600, 600),
                frame(100, 1500, 600, 600),
                frame(900, 100, 600, 600),
                frame(900, 800, 600, 600),
                frame(900, 1500, 600, 600),
            ],
            15,
            8,
        ),
    ]
}

/// First built-in layout that composes exactly `photo_count` photos
pub fn template_for_photo_count(photo_count: usize) -> Option<Template> {
    builtin_templates()
        .into_iter()
        .find(|t| t.frame_count() == photo_count)
}

/// Built-in layout by its catalog name
pub fn template_by_name(name: &str) -> Option<Template> {
    builtin_templates().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_templates_are_valid() {
        let templates = builtin_templates();
        assert_eq!(templates.len(), 6);
        for template in &templates {
            assert!(template.frame_count() >= 1);
            for (i, frame) in template.frames.iter().enumerate() {
                assert_eq!(frame.frame_index, i);
            }
        }
    }

    #[test]
    fn test_template_for_photo_count_finds_first_match() {
        let template = template_for_photo_count(4).unwrap();
        assert_eq!(template.name, "4 Fotos Grid");
        assert_eq!(template.frame_count(), 4);

        assert!(template_for_photo_count(5).is_none());
    }

    #[test]
    fn test_template_by_name() {
        let template = template_by_name("2 Fotos Horizontal").unwrap();
        assert_eq!(template.canvas.width, 2400);
        assert_eq!(template.canvas.height, 1200);
        assert_eq!(template.styling.border_width, 10);

        assert!(template_by_name("no such layout").is_none());
    }
}
