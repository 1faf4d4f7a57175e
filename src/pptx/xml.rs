use anyhow::{Result, anyhow};
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use super::package::attr;

pub(crate) const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
pub(crate) const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";

const EMU_PER_INCH: f64 = 914_400.0;
pub(crate) const GROUP_PROPERTIES: &str = "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/><a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr>";

pub(crate) fn emu(inches: f64) -> i64 {
    (inches * EMU_PER_INCH).round() as i64
}

pub(crate) fn inches(emu: i64) -> f64 {
    emu as f64 / EMU_PER_INCH
}

pub(crate) fn namespaces() -> String {
    format!("xmlns:a=\"{}\" xmlns:r=\"{}\" xmlns:p=\"{}\"", NS_A, NS_R, NS_P)
}

/// Shape geometry in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EmuFrame {
    pub(crate) x: i64,
    pub(crate) y: i64,
    pub(crate) cx: i64,
    pub(crate) cy: i64,
}

impl EmuFrame {
    fn xfrm(&self) -> String {
        format!(
            "<a:xfrm><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></a:xfrm>",
            self.x, self.y, self.cx, self.cy
        )
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RunStyle<'a> {
    pub(crate) size_pt: Option<u32>,
    pub(crate) typeface: Option<&'a str>,
    pub(crate) align_left: bool,
}

pub(crate) fn spanning_tree(shapes: &str) -> String {
    format!("<p:cSld><p:spTree>{}{}</p:spTree></p:cSld>", GROUP_PROPERTIES, shapes)
}

pub(crate) fn slide_xml(shapes: &str) -> String {
    format!(
        "{}<p:sld {}>{}<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>",
        XML_DECL,
        namespaces(),
        spanning_tree(shapes)
    )
}

pub(crate) fn notes_slide_xml(notes: &str) -> String {
    let shapes = format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"2\" name=\"Slide Image Placeholder 1\"/><p:cNvSpPr><a:spLocks noGrp=\"1\" noRot=\"1\" noChangeAspect=\"1\"/></p:cNvSpPr><p:nvPr><p:ph type=\"sldImg\"/></p:nvPr></p:nvSpPr><p:spPr/></p:sp>{}",
        placeholder_xml(3, "Notes Placeholder 2", "<p:ph type=\"body\" idx=\"1\"/>", notes, &RunStyle::default())
    );
    format!(
        "{}<p:notes {}>{}<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:notes>",
        XML_DECL,
        namespaces(),
        spanning_tree(&shapes)
    )
}

/// A placeholder shape that inherits its geometry from the slide layout.
pub(crate) fn placeholder_xml(
    id: u32,
    name: &str,
    placeholder: &str,
    text: &str,
    style: &RunStyle<'_>,
) -> String {
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{}\" name=\"{}\"/><p:cNvSpPr><a:spLocks noGrp=\"1\"/></p:cNvSpPr><p:nvPr>{}</p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{}</p:txBody></p:sp>",
        id,
        escape(name),
        placeholder,
        paragraphs_xml(text, style)
    )
}

pub(crate) fn text_box_xml(
    id: u32,
    name: &str,
    frame: EmuFrame,
    text: &str,
    style: &RunStyle<'_>,
) -> String {
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{}\" name=\"{}\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap=\"square\" rtlCol=\"0\"><a:spAutoFit/></a:bodyPr><a:lstStyle/>{}</p:txBody></p:sp>",
        id,
        escape(name),
        frame.xfrm(),
        paragraphs_xml(text, style)
    )
}

pub(crate) fn picture_xml(id: u32, name: &str, rel_id: &str, frame: EmuFrame) -> String {
    format!(
        "<p:pic><p:nvPicPr><p:cNvPr id=\"{}\" name=\"{}\"/><p:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed=\"{}\"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr></p:pic>",
        id,
        escape(name),
        escape(rel_id),
        frame.xfrm()
    )
}

/// One `<a:p>` per line of `text`.
pub(crate) fn paragraphs_xml(text: &str, style: &RunStyle<'_>) -> String {
    let mut run_props = String::from("<a:rPr lang=\"en-US\" dirty=\"0\"");
    if let Some(size) = style.size_pt {
        run_props.push_str(&format!(" sz=\"{}\"", size * 100));
    }
    match style.typeface {
        Some(face) => run_props.push_str(&format!(
            "><a:latin typeface=\"{0}\"/><a:cs typeface=\"{0}\"/></a:rPr>",
            escape(face)
        )),
        None => run_props.push_str("/>"),
    }
    let para_props = if style.align_left {
        "<a:pPr algn=\"l\"/>"
    } else {
        ""
    };

    let cleaned = sanitize_text(text);
    let mut xml = String::new();
    for line in cleaned.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            xml.push_str(&format!("<a:p>{}<a:endParaRPr lang=\"en-US\" dirty=\"0\"/></a:p>", para_props));
        } else {
            xml.push_str(&format!(
                "<a:p>{}<a:r>{}<a:t>{}</a:t></a:r></a:p>",
                para_props,
                run_props,
                escape(line)
            ));
        }
    }
    xml
}

/// Drops characters XML 1.0 cannot carry.
fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlideRef {
    pub(crate) id: u32,
    pub(crate) rel_id: String,
}

/// Slide ids from `p:sldIdLst`, in presentation order.
pub(crate) fn read_slide_list(xml: &[u8]) -> Result<Vec<SlideRef>> {
    let mut slides = Vec::new();
    for_each_element(xml, b"sldId", |e| {
        let id = attr(e, b"id")?
            .and_then(|value| value.parse::<u32>().ok())
            .ok_or_else(|| anyhow!("slide id without numeric id"))?;
        let rel_id = attr(e, b"r:id")?.ok_or_else(|| anyhow!("slide id without r:id"))?;
        slides.push(SlideRef { id, rel_id });
        Ok(())
    })?;
    Ok(slides)
}

/// Relationship ids of every element named `local_name`, in document order.
pub(crate) fn read_rel_ids(xml: &[u8], local_name: &[u8]) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for_each_element(xml, local_name, |e| {
        if let Some(id) = attr(e, b"r:id")? {
            ids.push(id);
        }
        Ok(())
    })?;
    Ok(ids)
}

pub(crate) fn count_elements(xml: &[u8], local_name: &[u8]) -> Result<usize> {
    let mut count = 0;
    for_each_element(xml, local_name, |_| {
        count += 1;
        Ok(())
    })?;
    Ok(count)
}

/// Offset and extent of every `<p:pic>` in a slide, in document order.
pub(crate) fn read_picture_frames(xml: &[u8]) -> Result<Vec<EmuFrame>> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut frames = Vec::new();
    let mut current: Option<EmuFrame> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"p:pic" => {
                current = Some(EmuFrame { x: 0, y: 0, cx: 0, cy: 0 });
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"p:pic" => {
                frames.extend(current.take());
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if let Some(frame) = current.as_mut() {
                    match e.name().as_ref() {
                        b"a:off" => {
                            frame.x = emu_attr(&e, b"x")?;
                            frame.y = emu_attr(&e, b"y")?;
                        }
                        b"a:ext" => {
                            frame.cx = emu_attr(&e, b"cx")?;
                            frame.cy = emu_attr(&e, b"cy")?;
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse slide xml: {}", err)),
        }
        buf.clear();
    }
    Ok(frames)
}

fn emu_attr(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Result<i64> {
    let value = attr(e, name)?.unwrap_or_default();
    value
        .parse()
        .map_err(|_| anyhow!("invalid EMU value: {:?}", value))
}

/// Concatenated `<a:t>` text of a part, one paragraph per line.
pub(crate) fn extract_text(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"a:t" => in_text = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"a:t" => in_text = false,
            Ok(Event::End(e)) if e.name().as_ref() == b"a:p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| anyhow!("invalid slide text: {}", err))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse slide xml: {}", err)),
        }
        buf.clear();
    }
    Ok(paragraphs.join("\n"))
}

/// Appends `children` to the list element `list` (e.g. `p:sldIdLst`). When the list is
/// absent it is created in front of the first element named in `before`.
pub(crate) fn append_to_list(xml: &[u8], list: &str, children: &str, before: &[&str]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();
    let mut done = false;
    let list_name = list.as_bytes();
    let wrapped = format!("<{0}>{1}</{0}>", list, children);

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if !done && e.name().as_ref() == list_name {
                    writer.write_event(Event::Start(e))?;
                    continue_list(&mut reader, &mut writer, list_name, children)?;
                    done = true;
                } else {
                    if !done && before.iter().any(|name| e.name().as_ref() == name.as_bytes()) {
                        writer.get_mut().extend_from_slice(wrapped.as_bytes());
                        done = true;
                    }
                    writer.write_event(Event::Start(e))?;
                }
            }
            Ok(Event::Empty(e)) => {
                if !done && e.name().as_ref() == list_name {
                    writer.write_event(Event::Start(e))?;
                    writer.get_mut().extend_from_slice(children.as_bytes());
                    writer.write_event(Event::End(BytesEnd::new(list)))?;
                    done = true;
                } else {
                    if !done && before.iter().any(|name| e.name().as_ref() == name.as_bytes()) {
                        writer.get_mut().extend_from_slice(wrapped.as_bytes());
                        done = true;
                    }
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(event) => writer.write_event(event)?,
            Err(err) => return Err(anyhow!("failed to parse xml: {}", err)),
        }
        buf.clear();
    }

    if !done {
        return Err(anyhow!("no place to insert {}", list));
    }
    Ok(writer.into_inner())
}

fn continue_list(
    reader: &mut Reader<Cursor<&[u8]>>,
    writer: &mut Writer<Vec<u8>>,
    list_name: &[u8],
    children: &str,
) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::End(e)) if e.name().as_ref() == list_name => {
                writer.get_mut().extend_from_slice(children.as_bytes());
                writer.write_event(Event::End(e))?;
                return Ok(());
            }
            Ok(Event::Eof) => return Err(anyhow!("unterminated list element")),
            Ok(event) => writer.write_event(event)?,
            Err(err) => return Err(anyhow!("failed to parse xml: {}", err)),
        }
        buf.clear();
    }
}

fn for_each_element<F>(xml: &[u8], local_name: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(&quick_xml::events::BytesStart<'_>) -> Result<()>,
{
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == local_name => {
                visit(&e)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse xml: {}", err)),
        }
        buf.clear();
    }
    Ok(())
}
