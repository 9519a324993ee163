//! Folding a `org.freedesktop.DBus.Introspectable.Introspect` XML reply
//! into structured data.
//!
//! This is a narrow, read-only reader: it does not validate against the
//! introspection DTD and does not recurse into child `<node>` elements
//! beyond recording their names.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, ErrorKind, Result};
use crate::signature::Type;

/// The root of a parsed introspection document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Interfaces declared directly on this node.
    pub interfaces: Vec<Interface>,
    /// Names of child nodes, relative to this one. Their own interfaces are
    /// not fetched or parsed.
    pub children: Vec<String>,
}

/// A single D-Bus interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interface {
    /// The interface name, e.g. `org.freedesktop.DBus.Properties`.
    pub name: String,
    /// Methods declared on this interface.
    pub methods: Vec<Method>,
    /// Signals declared on this interface.
    pub signals: Vec<Signal>,
    /// Properties declared on this interface.
    pub properties: Vec<Property>,
}

/// A method declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Method {
    /// The method name.
    pub name: String,
    /// In and out arguments, in declaration order.
    pub arguments: Vec<Argument>,
}

/// A signal declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    /// The signal name.
    pub name: String,
    /// The signal's arguments. Signals have no `out`/`in` distinction on
    /// the wire, but the XML may still tag them; both are accepted.
    pub arguments: Vec<Argument>,
}

/// An argument to a method or signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// The argument's name, if the document gave it one.
    pub name: Option<String>,
    /// The argument's type.
    pub ty: Type,
    /// Whether this is an input or output argument.
    pub direction: Direction,
}

/// The direction of an [`Argument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// An `in` argument, passed by the caller.
    In,
    /// An `out` argument, returned by the callee. The default when a
    /// `<method>` argument omits `direction` entirely.
    Out,
}

/// A property declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// The property name.
    pub name: String,
    /// The property's type.
    pub ty: Type,
    /// The property's access mode.
    pub access: PropertyAccess,
}

/// The access mode of a [`Property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccess {
    /// `access="read"`.
    Read,
    /// `access="write"`.
    Write,
    /// `access="readwrite"`.
    ReadWrite,
}

/// Parse an introspection XML document into a [`Node`].
///
/// A leading `<!DOCTYPE ...>` declaration, which real bus daemons
/// routinely prepend, is tolerated: the underlying parser skips it as a
/// `DocType` event.
pub fn parse(xml: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut node = Node::default();
    let mut interface: Option<Interface> = None;
    let mut method: Option<Method> = None;
    let mut signal: Option<Signal> = None;
    let mut buf = Vec::new();
    let mut seen_root = false;
    let mut root_is_node = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Eof => break,
            Event::DocType(_) => {}
            Event::Start(tag) | Event::Empty(tag) => {
                if !seen_root {
                    seen_root = true;
                    root_is_node = tag.name().as_ref() == b"node";
                }

                match tag.name().as_ref() {
                    b"node" => {
                        if let Some(name) = attr(&tag, b"name")? {
                            if interface.is_none() {
                                // A nested <node name="..."/> child reference;
                                // the outermost <node> is the document root
                                // and carries no name we need to record.
                                node.children.push(name);
                            }
                        }
                    }
                    b"interface" => {
                        let name = attr(&tag, b"name")?
                            .ok_or_else(|| xml_err_str("interface missing name"))?;
                        interface = Some(Interface {
                            name,
                            ..Interface::default()
                        });
                    }
                    b"method" => {
                        let name =
                            attr(&tag, b"name")?.ok_or_else(|| xml_err_str("method missing name"))?;
                        method = Some(Method {
                            name,
                            ..Method::default()
                        });
                    }
                    b"signal" => {
                        let name =
                            attr(&tag, b"name")?.ok_or_else(|| xml_err_str("signal missing name"))?;
                        signal = Some(Signal {
                            name,
                            ..Signal::default()
                        });
                    }
                    b"arg" => {
                        let name = attr(&tag, b"name")?;
                        let ty_str =
                            attr(&tag, b"type")?.ok_or_else(|| xml_err_str("arg missing type"))?;
                        let ty = Type::parse(&ty_str)?;
                        let direction = match attr(&tag, b"direction")?.as_deref() {
                            Some("in") => Direction::In,
                            _ => Direction::Out,
                        };
                        let argument = Argument { name, ty, direction };

                        if let Some(method) = method.as_mut() {
                            method.arguments.push(argument);
                        } else if let Some(signal) = signal.as_mut() {
                            signal.arguments.push(argument);
                        }
                    }
                    b"property" => {
                        let name = attr(&tag, b"name")?
                            .ok_or_else(|| xml_err_str("property missing name"))?;
                        let ty_str = attr(&tag, b"type")?
                            .ok_or_else(|| xml_err_str("property missing type"))?;
                        let ty = Type::parse(&ty_str)?;
                        let access = match attr(&tag, b"access")?.as_deref() {
                            Some("read") => PropertyAccess::Read,
                            Some("write") => PropertyAccess::Write,
                            _ => PropertyAccess::ReadWrite,
                        };

                        if let Some(interface) = interface.as_mut() {
                            interface.properties.push(Property { name, ty, access });
                        }
                    }
                    _ => {}
                }
            }
            Event::End(tag) => match tag.name().as_ref() {
                b"method" => {
                    if let (Some(m), Some(iface)) = (method.take(), interface.as_mut()) {
                        iface.methods.push(m);
                    }
                }
                b"signal" => {
                    if let (Some(s), Some(iface)) = (signal.take(), interface.as_mut()) {
                        iface.signals.push(s);
                    }
                }
                b"interface" => {
                    if let Some(iface) = interface.take() {
                        node.interfaces.push(iface);
                    }
                }
                _ => {}
            },
            _ => {}
        }

        buf.clear();
    }

    if !root_is_node {
        return Err(xml_err_str("document's outermost element is not <node>"));
    }

    Ok(node)
}

fn attr(tag: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attribute in tag.attributes() {
        let attribute = attribute.map_err(|e| xml_err_str(&e.to_string()))?;

        if attribute.key.as_ref() == key {
            let value = attribute
                .unescape_value()
                .map_err(|e| xml_err_str(&e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }

    Ok(None)
}

fn xml_err(error: quick_xml::Error) -> Error {
    Error::new(ErrorKind::Introspection(error.to_string().into()))
}

fn xml_err_str(message: &str) -> Error {
    Error::new(ErrorKind::Introspection(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node>
  <interface name="org.freedesktop.DBus.Introspectable">
    <method name="Introspect">
      <arg name="xml_data" type="s" direction="out"/>
    </method>
  </interface>
  <interface name="org.example.Greeter">
    <method name="Greet">
      <arg name="name" type="s" direction="in"/>
      <arg name="greeting" type="s" direction="out"/>
    </method>
    <signal name="Greeted">
      <arg name="name" type="s"/>
    </signal>
    <property name="Count" type="u" access="read"/>
  </interface>
  <node name="child"/>
</node>
"#;

    #[test]
    fn parses_interfaces_methods_signals_and_properties() {
        let node = parse(SAMPLE).unwrap();
        assert_eq!(node.interfaces.len(), 2);
        assert_eq!(node.children, vec!["child".to_string()]);

        let greeter = &node.interfaces[1];
        assert_eq!(greeter.name, "org.example.Greeter");
        assert_eq!(greeter.methods[0].name, "Greet");
        assert_eq!(greeter.methods[0].arguments[0].direction, Direction::In);
        assert_eq!(greeter.methods[0].arguments[1].direction, Direction::Out);
        assert_eq!(greeter.signals[0].name, "Greeted");
        assert_eq!(greeter.properties[0].name, "Count");
        assert_eq!(greeter.properties[0].access, PropertyAccess::Read);
        assert_eq!(greeter.properties[0].ty, Type::Uint32);
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(parse("<node><interface></node>").is_err());
    }

    #[test]
    fn rejects_unknown_root_element() {
        let err = parse("<foo/>").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Introspection(_)));
    }
}
