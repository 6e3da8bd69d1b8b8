//! Headless demo: renders a ring of overlapping transparent quads under an
//! orbiting camera and writes the accumulated result to a PNG.
//!
//! ```text
//! lucent-demo [config.toml] [output.png]
//! ```

use std::path::PathBuf;

use lucent::scene::{GeometryBuilder, Material, Mesh, Node, Scene, Transform};
use lucent::{FlyCamera, GpuContext, Quat, RenderConfig, RenderResult, TransparencyRenderer, Vec3, Vec4};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const FRAMES: u32 = 32;
const QUADS: u32 = 12;
const BACKGROUND: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.06,
    b: 0.09,
    a: 1.0,
};

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> RenderResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.iter().find(|a| a.ends_with(".toml")) {
        Some(path) => {
            log::info!("loading config from {path}");
            RenderConfig::from_toml_str(&std::fs::read_to_string(path)?)?
        }
        None => RenderConfig::default(),
    };
    let output = args
        .iter()
        .find(|a| !a.ends_with(".toml"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lucent.png"));

    let gpu = GpuContext::headless()?;
    let (scene, geometry) = build_scene()?;
    let geometry = geometry.upload(&gpu);

    let mut renderer = TransparencyRenderer::new(&gpu, config, WIDTH, HEIGHT)?;
    renderer.attach_to_scene(&gpu, &scene)?;
    {
        let frame = renderer.constants_mut();
        frame.make_projection(60f32.to_radians(), WIDTH as f32 / HEIGHT as f32, 0.1, 100.0);
        frame.set_sun_direction(Vec3::new(-0.4, -1.0, -0.3));
        frame.set_sun_color(Vec3::new(1.0, 0.95, 0.9));
    }

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.03;
        let camera = FlyCamera::looking_at(Vec3::new(6.0 * angle.sin(), 2.0, 6.0 * angle.cos()), Vec3::ZERO);
        renderer.constants_mut().set_view_matrix(camera.view_matrix());

        renderer.next_frame();
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Demo Frame Encoder"),
        });
        clear_opaque(&mut encoder, &renderer);
        renderer.render(&gpu, &mut encoder, &geometry);
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    let image = renderer.targets().color().read_rgba8(&gpu)?;
    image.save(&output)?;
    log::info!("wrote {} after {FRAMES} frames", output.display());
    Ok(())
}

/// Quads in three tints arranged in a ring, plus an opaque cube in the middle.
///
/// The cube is filtered out by the blend predicate and never reaches the
/// A-buffer.
fn build_scene() -> RenderResult<(Scene, GeometryBuilder)> {
    let mut geometry = GeometryBuilder::new();
    let quad = geometry.push_quad();
    let cube = geometry.push_cube();

    let materials = vec![
        Material::opaque(Vec4::new(0.6, 0.6, 0.6, 1.0)),
        Material::blend(Vec4::new(0.9, 0.2, 0.2, 0.45)),
        Material::blend(Vec4::new(0.2, 0.8, 0.3, 0.45)),
        Material::blend(Vec4::new(0.2, 0.4, 0.95, 0.45)),
    ];
    let meshes = vec![
        Mesh::new(vec![cube.with_material(0)]),
        Mesh::new(vec![quad.with_material(1)]),
        Mesh::new(vec![quad.with_material(2)]),
        Mesh::new(vec![quad.with_material(3)]),
    ];

    // Node 0 groups the ring, node 1 is the cube, ring quads follow.
    let ring: Vec<u32> = (2..2 + QUADS).collect();
    let mut nodes = vec![
        Node::new(Transform::new().into()).with_children(ring),
        Node::new(Transform::new().into()).with_mesh(0),
    ];
    for i in 0..QUADS {
        let angle = i as f32 / QUADS as f32 * std::f32::consts::TAU;
        let transform = Transform::from_position(Vec3::new(1.5 * angle.cos(), 0.0, 1.5 * angle.sin()))
            .rotation(Quat::from_rotation_y(-angle))
            .uniform_scale(2.0);
        nodes.push(Node::new(transform.into()).with_mesh(1 + i % 3));
    }

    let scene = Scene::new(nodes, vec![0, 1], meshes, materials)?;
    Ok((scene, geometry))
}

/// Stands in for the host's opaque pass: background color, far depth and
/// zero motion.
fn clear_opaque(encoder: &mut wgpu::CommandEncoder, renderer: &TransparencyRenderer) {
    let targets = renderer.targets();
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Opaque Clear Pass"),
        color_attachments: &[
            clear_to(&targets.color().view, BACKGROUND),
            clear_to(&targets.velocity().view, wgpu::Color::TRANSPARENT),
        ],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &targets.depth().view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

fn clear_to(view: &wgpu::TextureView, color: wgpu::Color) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(color),
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}
