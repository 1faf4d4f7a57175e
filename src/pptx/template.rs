use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::package::{
    CT_PRESENTATION, CT_RELS, CT_SLIDE_LAYOUT, CT_SLIDE_MASTER, CT_THEME, CT_XML, ContentTypes,
    Package, RT_OFFICE_DOCUMENT, RT_SLIDE_LAYOUT, RT_SLIDE_MASTER, RT_THEME, Relationships,
    CONTENT_TYPES_PART, ROOT_RELS_PART,
};
use super::xml::{GROUP_PROPERTIES, XML_DECL, namespaces, spanning_tree};

pub(crate) const PRESENTATION_PART: &str = "ppt/presentation.xml";
const MASTER_PART: &str = "ppt/slideMasters/slideMaster1.xml";
const TITLE_LAYOUT_PART: &str = "ppt/slideLayouts/slideLayout1.xml";
const CONTENT_LAYOUT_PART: &str = "ppt/slideLayouts/slideLayout2.xml";
const THEME_PART: &str = "ppt/theme/theme1.xml";

const CLR_MAP: &str = "<p:clrMap bg1=\"lt1\" tx1=\"dk1\" bg2=\"lt2\" tx2=\"dk2\" accent1=\"accent1\" accent2=\"accent2\" accent3=\"accent3\" accent4=\"accent4\" accent5=\"accent5\" accent6=\"accent6\" hlink=\"hlink\" folHlink=\"folHlink\"/>";

/// Writes a blank widescreen deck with a title layout and a title-and-content layout.
pub fn write_default_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    default_package().write(path)
}

pub(crate) fn default_package() -> Package {
    let mut package = Package::default();

    let mut types = ContentTypes::default();
    types.ensure_default("rels", CT_RELS);
    types.ensure_default("xml", CT_XML);
    types.set_override(PRESENTATION_PART, CT_PRESENTATION);
    types.set_override(MASTER_PART, CT_SLIDE_MASTER);
    types.set_override(TITLE_LAYOUT_PART, CT_SLIDE_LAYOUT);
    types.set_override(CONTENT_LAYOUT_PART, CT_SLIDE_LAYOUT);
    types.set_override(THEME_PART, CT_THEME);
    package.insert(CONTENT_TYPES_PART, types.to_xml());

    let mut root = Relationships::default();
    root.add(RT_OFFICE_DOCUMENT, PRESENTATION_PART);
    package.insert(ROOT_RELS_PART, root.to_xml());

    let mut presentation_rels = Relationships::default();
    let master_rel = presentation_rels.add(RT_SLIDE_MASTER, "slideMasters/slideMaster1.xml");
    presentation_rels.add(RT_THEME, "theme/theme1.xml");
    package.set_relationships(PRESENTATION_PART, &presentation_rels);
    package.insert(PRESENTATION_PART, presentation_xml(&master_rel));

    let mut master_rels = Relationships::default();
    let title_rel = master_rels.add(RT_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml");
    let content_rel = master_rels.add(RT_SLIDE_LAYOUT, "../slideLayouts/slideLayout2.xml");
    master_rels.add(RT_THEME, "../theme/theme1.xml");
    package.set_relationships(MASTER_PART, &master_rels);
    package.insert(MASTER_PART, master_xml(&title_rel, &content_rel));

    for (part, xml) in [
        (TITLE_LAYOUT_PART, title_layout_xml()),
        (CONTENT_LAYOUT_PART, content_layout_xml()),
    ] {
        let mut rels = Relationships::default();
        rels.add(RT_SLIDE_MASTER, "../slideMasters/slideMaster1.xml");
        package.set_relationships(part, &rels);
        package.insert(part, xml);
    }

    package.insert(THEME_PART, theme_xml());
    package
}

fn presentation_xml(master_rel: &str) -> String {
    format!(
        "{}<p:presentation {} saveSubsetFonts=\"1\"><p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"{}\"/></p:sldMasterIdLst><p:sldSz cx=\"12192000\" cy=\"6858000\"/><p:notesSz cx=\"6858000\" cy=\"9144000\"/><p:defaultTextStyle><a:defPPr><a:defRPr lang=\"en-US\"/></a:defPPr></p:defaultTextStyle></p:presentation>",
        XML_DECL,
        namespaces(),
        master_rel
    )
}

fn placeholder(id: u32, name: &str, ph: &str, x: i64, y: i64, cx: i64, cy: i64) -> String {
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{}\" name=\"{}\"/><p:cNvSpPr><a:spLocks noGrp=\"1\"/></p:cNvSpPr><p:nvPr>{}</p:nvPr></p:nvSpPr><p:spPr><a:xfrm><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></a:xfrm><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:endParaRPr lang=\"en-US\"/></a:p></p:txBody></p:sp>",
        id, name, ph, x, y, cx, cy
    )
}

fn master_xml(title_rel: &str, content_rel: &str) -> String {
    let shapes = format!(
        "{}{}",
        placeholder(2, "Title Placeholder 1", "<p:ph type=\"title\"/>", 838200, 365125, 10515600, 1325563),
        placeholder(3, "Text Placeholder 2", "<p:ph type=\"body\" idx=\"1\"/>", 838200, 1825625, 10515600, 4351338),
    );
    format!(
        "{}<p:sldMaster {}>{}{}<p:sldLayoutIdLst><p:sldLayoutId id=\"2147483649\" r:id=\"{}\"/><p:sldLayoutId id=\"2147483650\" r:id=\"{}\"/></p:sldLayoutIdLst><p:txStyles><p:titleStyle><a:lvl1pPr algn=\"l\"><a:defRPr sz=\"4400\" kern=\"1200\"><a:solidFill><a:schemeClr val=\"tx1\"/></a:solidFill><a:latin typeface=\"+mj-lt\"/></a:defRPr></a:lvl1pPr></p:titleStyle><p:bodyStyle><a:lvl1pPr marL=\"228600\" indent=\"-228600\"><a:buFont typeface=\"Arial\"/><a:buChar char=\"&#8226;\"/><a:defRPr sz=\"2800\" kern=\"1200\"><a:solidFill><a:schemeClr val=\"tx1\"/></a:solidFill><a:latin typeface=\"+mn-lt\"/></a:defRPr></a:lvl1pPr></p:bodyStyle><p:otherStyle><a:defPPr><a:defRPr lang=\"en-US\"/></a:defPPr></p:otherStyle></p:txStyles></p:sldMaster>",
        XML_DECL,
        namespaces(),
        spanning_tree(&shapes),
        CLR_MAP,
        title_rel,
        content_rel
    )
}

fn layout_xml(layout_type: &str, name: &str, shapes: &str) -> String {
    format!(
        "{}<p:sldLayout {} type=\"{}\" preserve=\"1\"><p:cSld name=\"{}\"><p:spTree>{}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>",
        XML_DECL,
        namespaces(),
        layout_type,
        name,
        GROUP_PROPERTIES,
        shapes
    )
}

fn title_layout_xml() -> String {
    let shapes = format!(
        "{}{}",
        placeholder(2, "Title 1", "<p:ph type=\"ctrTitle\"/>", 1524000, 1122363, 9144000, 2387600),
        placeholder(3, "Subtitle 2", "<p:ph type=\"subTitle\" idx=\"1\"/>", 1524000, 3602038, 9144000, 1655762),
    );
    layout_xml("title", "Title Slide", &shapes)
}

fn content_layout_xml() -> String {
    let shapes = format!(
        "{}{}",
        placeholder(2, "Title 1", "<p:ph type=\"title\"/>", 838200, 365125, 10515600, 1325563),
        placeholder(3, "Content Placeholder 2", "<p:ph idx=\"1\"/>", 838200, 1825625, 10515600, 4351338),
    );
    layout_xml("obj", "Title and Content", &shapes)
}

/// Notes master, created the first time a deck gets presenter notes.
pub(crate) fn notes_master_xml() -> String {
    let shapes = format!(
        "{}{}",
        placeholder(2, "Slide Image Placeholder 1", "<p:ph type=\"sldImg\" idx=\"2\"/>", 685800, 1143000, 5486400, 3086100),
        placeholder(3, "Notes Placeholder 2", "<p:ph type=\"body\" sz=\"quarter\" idx=\"3\"/>", 685800, 4400550, 5486400, 3600450),
    );
    format!(
        "{}<p:notesMaster {}>{}{}<p:notesStyle><a:lvl1pPr marL=\"0\" algn=\"l\"><a:defRPr sz=\"1200\" kern=\"1200\"><a:solidFill><a:schemeClr val=\"tx1\"/></a:solidFill><a:latin typeface=\"+mn-lt\"/></a:defRPr></a:lvl1pPr></p:notesStyle></p:notesMaster>",
        XML_DECL,
        namespaces(),
        spanning_tree(&shapes),
        CLR_MAP
    )
}

pub(crate) fn theme_xml() -> String {
    let fill = "<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>";
    let line = "<a:ln w=\"6350\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:ln>";
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        "{decl}<a:theme xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" name=\"Office Theme\"><a:themeElements><a:clrScheme name=\"Office\"><a:dk1><a:sysClr val=\"windowText\" lastClr=\"000000\"/></a:dk1><a:lt1><a:sysClr val=\"window\" lastClr=\"FFFFFF\"/></a:lt1><a:dk2><a:srgbClr val=\"44546A\"/></a:dk2><a:lt2><a:srgbClr val=\"E7E6E6\"/></a:lt2><a:accent1><a:srgbClr val=\"4472C4\"/></a:accent1><a:accent2><a:srgbClr val=\"ED7D31\"/></a:accent2><a:accent3><a:srgbClr val=\"A5A5A5\"/></a:accent3><a:accent4><a:srgbClr val=\"FFC000\"/></a:accent4><a:accent5><a:srgbClr val=\"5B9BD5\"/></a:accent5><a:accent6><a:srgbClr val=\"70AD47\"/></a:accent6><a:hlink><a:srgbClr val=\"0563C1\"/></a:hlink><a:folHlink><a:srgbClr val=\"954F72\"/></a:folHlink></a:clrScheme><a:fontScheme name=\"Office\"><a:majorFont><a:latin typeface=\"Calibri Light\"/><a:ea typeface=\"\"/><a:cs typeface=\"\"/></a:majorFont><a:minorFont><a:latin typeface=\"Calibri\"/><a:ea typeface=\"\"/><a:cs typeface=\"\"/></a:minorFont></a:fontScheme><a:fmtScheme name=\"Office\"><a:fillStyleLst>{fill}{fill}{fill}</a:fillStyleLst><a:lnStyleLst>{line}{line}{line}</a:lnStyleLst><a:effectStyleLst>{effect}{effect}{effect}</a:effectStyleLst><a:bgFillStyleLst>{fill}{fill}{fill}</a:bgFillStyleLst></a:fmtScheme></a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>",
        decl = XML_DECL,
        fill = fill,
        line = line,
        effect = effect
    )
}
