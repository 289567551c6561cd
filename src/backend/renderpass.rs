// Render pass construction
//
// Attachments are registered by name and subpasses refer to them by name.
// Names are resolved to indices at build time; an unknown name is an error.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::api::SharedDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub load: vk::AttachmentLoadOp,
    pub store: vk::AttachmentStoreOp,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl Attachment {
    pub fn is_depth(&self) -> bool {
        is_depth_format(self.format)
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Attachment usage of one subpass, by attachment name.
#[derive(Debug, Clone, Default)]
pub struct SubpassDescription {
    colors: Vec<String>,
    inputs: Vec<String>,
    depth: Option<String>,
}

impl SubpassDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_colors<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.colors.extend(names.iter().map(|n| n.as_ref().to_owned()));
        self
    }

    pub fn add_inputs<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.inputs.extend(names.iter().map(|n| n.as_ref().to_owned()));
        self
    }

    pub fn set_depth(mut self, name: impl Into<String>) -> Self {
        self.depth = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
struct SubpassRefs {
    colors: Vec<vk::AttachmentReference>,
    inputs: Vec<vk::AttachmentReference>,
    depth: Option<vk::AttachmentReference>,
}

/// Fully resolved render pass layout, ready to hand to the driver.
#[derive(Debug, Clone)]
struct Layout {
    attachments: Vec<vk::AttachmentDescription>,
    subpasses: Vec<SubpassRefs>,
    dependencies: Vec<vk::SubpassDependency>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassBuilder {
    attachments: Vec<(String, Attachment)>,
    subpasses: Vec<SubpassDescription>,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attachment(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.attachments.push((name.into(), attachment));
        self
    }

    pub fn add_subpass(mut self, description: SubpassDescription) -> Self {
        self.subpasses.push(description);
        self
    }

    pub fn build(&self, device: SharedDevice) -> Result<Arc<RenderPass>> {
        let layout = self.resolve()?;

        let subpasses: Vec<vk::SubpassDescription> = layout
            .subpasses
            .iter()
            .map(|refs| {
                let mut desc = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&refs.colors)
                    .input_attachments(&refs.inputs);
                if let Some(depth) = &refs.depth {
                    desc = desc.depth_stencil_attachment(depth);
                }
                desc.build()
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&layout.attachments)
            .subpasses(&subpasses)
            .dependencies(&layout.dependencies);

        let handle = device
            .create_render_pass(&create_info)
            .context("Failed to create render pass")?;

        log::debug!(
            "Render pass: {} attachments, {} subpasses, {} dependencies",
            layout.attachments.len(),
            subpasses.len(),
            layout.dependencies.len()
        );

        Ok(Arc::new(RenderPass {
            handle,
            subpass_count: AtomicU32::new(0),
            device,
        }))
    }

    fn index_of(&self, name: &str) -> Result<u32> {
        self.attachments
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| i as u32)
            .with_context(|| format!("Unable to find attachment '{name}'"))
    }

    fn resolve(&self) -> Result<Layout> {
        if self.subpasses.is_empty() {
            anyhow::bail!("Render pass needs at least one subpass");
        }

        let attachments = self
            .attachments
            .iter()
            .map(|(_, a)| describe_attachment(a))
            .collect();

        let mut subpasses: Vec<SubpassRefs> = Vec::with_capacity(self.subpasses.len());
        let mut dependencies = Vec::new();

        for (dst, desc) in self.subpasses.iter().enumerate() {
            let mut refs = SubpassRefs::default();

            for name in &desc.colors {
                refs.colors.push(vk::AttachmentReference {
                    attachment: self.index_of(name)?,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                });
            }

            if let Some(name) = &desc.depth {
                refs.depth = Some(vk::AttachmentReference {
                    attachment: self.index_of(name)?,
                    layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                });
            }

            for name in &desc.inputs {
                let index = self.index_of(name)?;
                refs.inputs.push(vk::AttachmentReference {
                    attachment: index,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                });

                // Wait on every earlier subpass that wrote this attachment
                for (src, earlier) in subpasses.iter().enumerate() {
                    if earlier.colors.iter().any(|c| c.attachment == index) {
                        dependencies.push(input_dependency(
                            src as u32,
                            dst as u32,
                            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                        ));
                    }
                    if earlier.depth.map(|d| d.attachment) == Some(index) {
                        dependencies.push(input_dependency(
                            src as u32,
                            dst as u32,
                            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                        ));
                    }
                }
            }

            subpasses.push(refs);
        }

        let last = (subpasses.len() - 1) as u32;
        dependencies.extend(external_dependencies(last));

        Ok(Layout {
            attachments,
            subpasses,
            dependencies,
        })
    }
}

fn describe_attachment(attachment: &Attachment) -> vk::AttachmentDescription {
    let desc = vk::AttachmentDescription::builder()
        .format(attachment.format)
        .samples(attachment.samples)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    if attachment.is_depth() {
        desc.load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(attachment.load)
            .stencil_store_op(attachment.store)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
            .build()
    } else {
        desc.load_op(attachment.load)
            .store_op(attachment.store)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build()
    }
}

fn input_dependency(
    src: u32,
    dst: u32,
    src_stage: vk::PipelineStageFlags,
    src_access: vk::AccessFlags,
) -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(src)
        .dst_subpass(dst)
        .src_stage_mask(src_stage)
        .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
        .src_access_mask(src_access)
        .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
        .dependency_flags(vk::DependencyFlags::BY_REGION)
        .build()
}

/// Ordering against work outside the pass, on entry to the first subpass and
/// on exit from the last one.
fn external_dependencies(last_subpass: u32) -> [vk::SubpassDependency; 2] {
    let attachment_stages =
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_stage_mask(attachment_stages)
            .dst_access_mask(attachment_access)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(last_subpass)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .src_access_mask(attachment_access)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
    ]
}

pub struct RenderPass {
    handle: vk::RenderPass,
    /// Pipelines built against this pass so far; the next one uses this as
    /// its subpass index.
    subpass_count: AtomicU32,
    device: SharedDevice,
}

impl RenderPass {
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpass_count.load(Ordering::Acquire)
    }

    /// Called once a pipeline has been created for the current subpass.
    pub(crate) fn advance_subpass(&self) {
        self.subpass_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;

    fn color(format: vk::Format) -> Attachment {
        Attachment {
            load: vk::AttachmentLoadOp::CLEAR,
            store: vk::AttachmentStoreOp::STORE,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    fn gbuffer_builder() -> RenderPassBuilder {
        RenderPassBuilder::new()
            .add_attachment("albedo", color(vk::Format::R8G8B8A8_UNORM))
            .add_attachment("depth", color(vk::Format::D32_SFLOAT))
            .add_attachment("out_image", color(vk::Format::B8G8R8A8_SRGB))
            .add_subpass(
                SubpassDescription::new()
                    .add_colors(&["albedo"])
                    .set_depth("depth"),
            )
            .add_subpass(
                SubpassDescription::new()
                    .add_colors(&["out_image"])
                    .add_inputs(&["albedo", "depth"]),
            )
    }

    #[test]
    fn unknown_attachment_name_fails() {
        let builder = RenderPassBuilder::new()
            .add_attachment("out_image", color(vk::Format::B8G8R8A8_SRGB))
            .add_subpass(SubpassDescription::new().add_colors(&["missing"]));

        let err = builder.resolve().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn depth_attachments_use_stencil_ops() {
        let layout = gbuffer_builder().resolve().unwrap();

        let depth = layout.attachments[1];
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.stencil_store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);

        let out = layout.attachments[2];
        assert_eq!(out.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(out.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(out.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn inputs_written_earlier_get_dependencies() {
        let layout = gbuffer_builder().resolve().unwrap();

        let internal: Vec<_> = layout
            .dependencies
            .iter()
            .filter(|d| d.src_subpass != vk::SUBPASS_EXTERNAL && d.dst_subpass != vk::SUBPASS_EXTERNAL)
            .collect();
        assert_eq!(internal.len(), 2);
        assert!(internal.iter().all(|d| d.src_subpass == 0 && d.dst_subpass == 1));
        assert!(internal
            .iter()
            .all(|d| d.dependency_flags == vk::DependencyFlags::BY_REGION));
        assert_eq!(internal[0].src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(
            internal[1].src_access_mask,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );

        assert_eq!(layout.subpasses[1].inputs.len(), 2);
        assert_eq!(
            layout.subpasses[1].inputs[0].layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn external_dependencies_bracket_the_pass() {
        let layout = gbuffer_builder().resolve().unwrap();
        let n = layout.dependencies.len();

        let enter = layout.dependencies[n - 2];
        assert_eq!(enter.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(enter.dst_subpass, 0);

        let exit = layout.dependencies[n - 1];
        assert_eq!(exit.src_subpass, 1);
        assert_eq!(exit.dst_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn build_creates_and_drop_destroys() {
        let mock = Arc::new(MockDevice::new());
        let render_pass = gbuffer_builder().build(mock.clone()).unwrap();

        assert!(mock.is_alive(render_pass.handle()));
        assert_eq!(mock.render_pass_subpass_count(render_pass.handle()), Some(2));
        assert_eq!(render_pass.subpass_count(), 0);

        let handle = render_pass.handle();
        drop(render_pass);
        assert!(!mock.is_alive(handle));
    }
}
