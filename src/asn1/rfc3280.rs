// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Distinguished name types defined in RFC 3280, plus the RFC 4519
//! attribute-type OIDs this system consumes.

use {
    bcder::{
        decode::{BytesSource, Constructed, DecodeError, Source},
        encode,
        encode::{PrimitiveContent, Values},
        string::{Ia5String, PrintableString, Utf8String},
        Captured, ConstOid, Mode, Oid, Tag,
    },
    std::{
        fmt::{Debug, Formatter},
        io::Write,
        ops::{Deref, DerefMut},
        str::FromStr,
    },
};

/// Common Name (CN)
///
/// 2.5.4.3
pub const OID_COMMON_NAME: ConstOid = Oid(&[85, 4, 3]);

/// Country Name (C)
///
/// 2.5.4.6
pub const OID_COUNTRY_NAME: ConstOid = Oid(&[85, 4, 6]);

/// Locality Name (L)
///
/// 2.5.4.7
pub const OID_LOCALITY_NAME: ConstOid = Oid(&[85, 4, 7]);

/// State or Province Name
///
/// 2.5.4.8
pub const OID_STATE_PROVINCE_NAME: ConstOid = Oid(&[85, 4, 8]);

/// Organization Name (O)
///
/// 2.5.4.10
pub const OID_ORGANIZATION_NAME: ConstOid = Oid(&[85, 4, 10]);

/// Directory string.
///
/// ```ASN.1
/// DirectoryString ::= CHOICE {
///       printableString         PrintableString (SIZE (1..MAX)),
///       utf8String              UTF8String (SIZE (1..MAX)) }
/// ```
///
/// The teletex, universal, and BMP alternatives are not decoded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DirectoryString {
    PrintableString(PrintableString),
    Utf8String(Utf8String),
}

impl DirectoryString {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_value(|tag, content| {
            if tag == Tag::PRINTABLE_STRING {
                Ok(Self::PrintableString(PrintableString::from_content(
                    content,
                )?))
            } else if tag == Tag::UTF8_STRING {
                Ok(Self::Utf8String(Utf8String::from_content(content)?))
            } else {
                Err(content
                    .content_err("only decoding of PrintableString and UTF8String is implemented"))
            }
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::PrintableString(ps) => (Some(ps.encode_ref()), None),
            Self::Utf8String(s) => (None, Some(s.encode_ref())),
        }
    }
}

impl std::fmt::Display for DirectoryString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrintableString(s) => f.write_str(&s.to_string()),
            Self::Utf8String(s) => f.write_str(&s.to_string()),
        }
    }
}

impl Values for DirectoryString {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// An X.501 Name.
///
/// ```ASN.1
/// Name ::= CHOICE { rdnSequence RDNSequence }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Name {
    RdnSequence(RdnSequence),
}

impl Name {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        Ok(Self::RdnSequence(RdnSequence::take_from(cons)?))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::RdnSequence(seq) => seq.encode_ref(),
        }
    }

    /// Iterate over all attributes in this Name.
    pub fn iter_attributes(&self) -> impl Iterator<Item = &AttributeTypeAndValue> {
        let Self::RdnSequence(seq) = self;
        seq.iter().flat_map(|rdn| rdn.iter())
    }

    /// Iterate over all attributes in this Name having a given OID.
    pub fn iter_by_oid(&self, oid: Oid) -> impl Iterator<Item = &AttributeTypeAndValue> {
        self.iter_attributes().filter(move |atv| atv.typ == oid)
    }

    /// Find the first attribute matching an OID.
    pub fn find_attribute(&self, oid: Oid) -> Option<&AttributeTypeAndValue> {
        self.iter_by_oid(oid).next()
    }

    /// Attempt to obtain the string value of the first attribute matching an OID.
    pub fn find_first_attribute_string(
        &self,
        oid: Oid,
    ) -> Result<Option<String>, DecodeError<<BytesSource as Source>::Error>> {
        if let Some(atv) = self.find_attribute(oid) {
            Ok(Some(atv.to_string()?))
        } else {
            Ok(None)
        }
    }

    /// Obtain a user friendly string representation of this instance.
    ///
    /// Renders common OIDs similarly to how OpenSSL prints certificate
    /// subjects. Unknown attributes are skipped; do not use the output for
    /// equality comparisons.
    pub fn user_friendly_str(&self) -> Result<String, DecodeError<<BytesSource as Source>::Error>> {
        let mut fields = vec![];

        for cn in self.iter_by_oid(Oid(OID_COMMON_NAME.as_ref().into())) {
            fields.push(format!("CN={}", cn.to_string()?));
        }
        for o in self.iter_by_oid(Oid(OID_ORGANIZATION_NAME.as_ref().into())) {
            fields.push(format!("O={}", o.to_string()?));
        }
        for l in self.iter_by_oid(Oid(OID_LOCALITY_NAME.as_ref().into())) {
            fields.push(format!("L={}", l.to_string()?));
        }
        for st in self.iter_by_oid(Oid(OID_STATE_PROVINCE_NAME.as_ref().into())) {
            fields.push(format!("ST={}", st.to_string()?));
        }
        for c in self.iter_by_oid(Oid(OID_COUNTRY_NAME.as_ref().into())) {
            fields.push(format!("C={}", c.to_string()?));
        }

        Ok(fields.join(", "))
    }

    /// Append a PrintableString attribute in a new RDN.
    pub fn append_printable_string(
        &mut self,
        oid: Oid,
        value: &str,
    ) -> Result<(), bcder::string::CharSetError> {
        let Self::RdnSequence(seq) = self;
        let mut rdn = RelativeDistinguishedName::default();
        rdn.push(AttributeTypeAndValue::new_printable_string(oid, value)?);
        seq.push(rdn);

        Ok(())
    }

    /// Append a Utf8String attribute in a new RDN.
    pub fn append_utf8_string(
        &mut self,
        oid: Oid,
        value: &str,
    ) -> Result<(), bcder::string::CharSetError> {
        let Self::RdnSequence(seq) = self;
        let mut rdn = RelativeDistinguishedName::default();
        rdn.push(AttributeTypeAndValue::new_utf8_string(oid, value)?);
        seq.push(rdn);

        Ok(())
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::RdnSequence(RdnSequence::default())
    }
}

impl Deref for Name {
    type Target = RdnSequence;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::RdnSequence(seq) => seq,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RdnSequence(Vec<RelativeDistinguishedName>);

impl Deref for RdnSequence {
    type Target = Vec<RelativeDistinguishedName>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RdnSequence {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl RdnSequence {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let mut values = Vec::new();

            while let Some(value) = RelativeDistinguishedName::take_opt_from(cons)? {
                values.push(value);
            }

            Ok(Self(values))
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(&self.0)
    }
}

/// Relative distinguished name.
///
/// ```ASN.1
/// RelativeDistinguishedName ::=
///   SET OF AttributeTypeAndValue
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RelativeDistinguishedName(Vec<AttributeTypeAndValue>);

impl Deref for RelativeDistinguishedName {
    type Target = Vec<AttributeTypeAndValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RelativeDistinguishedName {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl RelativeDistinguishedName {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_set(|cons| {
            let mut values = Vec::new();

            while let Some(value) = AttributeTypeAndValue::take_opt_from(cons)? {
                values.push(value);
            }

            Ok(Self(values))
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::set(&self.0)
    }
}

impl Values for RelativeDistinguishedName {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Attribute type and its value.
///
/// ```ASN.1
/// AttributeTypeAndValue ::= SEQUENCE {
///   type     AttributeType,
///   value    AttributeValue }
/// ```
#[derive(Clone)]
pub struct AttributeTypeAndValue {
    pub typ: AttributeType,
    pub value: AttributeValue,
}

impl Debug for AttributeTypeAndValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("AttributeTypeAndValue");
        s.field("type", &format_args!("{}", self.typ));
        s.field("value", &self.value);
        s.finish()
    }
}

impl AttributeTypeAndValue {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let typ = AttributeType::take_from(cons)?;
            let value = cons.capture_all()?;

            Ok(Self {
                typ,
                value: value.into(),
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.typ.encode_ref(), self.value.deref()))
    }

    /// Attempt to coerce the stored value to a Rust string.
    pub fn to_string(&self) -> Result<String, DecodeError<<BytesSource as Source>::Error>> {
        self.value.to_string()
    }

    pub fn new_printable_string(oid: Oid, s: &str) -> Result<Self, bcder::string::CharSetError> {
        Ok(Self {
            typ: oid,
            value: AttributeValue::new_printable_string(s)?,
        })
    }

    pub fn new_utf8_string(oid: Oid, s: &str) -> Result<Self, bcder::string::CharSetError> {
        Ok(Self {
            typ: oid,
            value: AttributeValue::new_utf8_string(s)?,
        })
    }
}

impl PartialEq for AttributeTypeAndValue {
    fn eq(&self, other: &Self) -> bool {
        self.typ == other.typ && self.value.as_slice() == other.value.as_slice()
    }
}

impl Eq for AttributeTypeAndValue {}

impl Values for AttributeTypeAndValue {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

pub type AttributeType = Oid;

#[derive(Clone)]
pub struct AttributeValue(Captured);

impl Debug for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", hex::encode(self.0.as_slice())))
    }
}

impl AttributeValue {
    pub fn new_printable_string(s: &str) -> Result<Self, bcder::string::CharSetError> {
        let ds = DirectoryString::PrintableString(PrintableString::from_str(s)?);

        Ok(Self(Captured::from_values(Mode::Der, ds)))
    }

    pub fn new_utf8_string(s: &str) -> Result<Self, bcder::string::CharSetError> {
        let ds = DirectoryString::Utf8String(Utf8String::from_str(s)?);

        Ok(Self(Captured::from_values(Mode::Der, ds)))
    }

    /// Attempt to convert the inner value to a Rust string.
    ///
    /// Several string types are attempted. If the inner type isn't a known
    /// string, a decoding error occurs.
    pub fn to_string(&self) -> Result<String, DecodeError<<BytesSource as Source>::Error>> {
        self.0.clone().decode(|cons| {
            if let Some(s) = cons.take_opt_value_if(Tag::PRINTABLE_STRING, |content| {
                PrintableString::from_content(content)
            })? {
                Ok(s.to_string())
            } else if let Some(s) = cons.take_opt_value_if(Tag::UTF8_STRING, |content| {
                Utf8String::from_content(content)
            })? {
                Ok(s.to_string())
            } else if let Some(s) = cons.take_opt_value_if(Tag::IA5_STRING, |content| {
                Ia5String::from_content(content)
            })? {
                Ok(s.to_string())
            } else {
                Ok(DirectoryString::take_from(cons)?.to_string())
            }
        })
    }
}

impl Deref for AttributeValue {
    type Target = Captured;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Captured> for AttributeValue {
    fn from(v: Captured) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_find() {
        let mut name = Name::default();
        name.append_printable_string(Oid(OID_COUNTRY_NAME.as_ref().into()), "BR")
            .unwrap();
        name.append_utf8_string(Oid(OID_COMMON_NAME.as_ref().into()), "Unit Tester")
            .unwrap();

        assert_eq!(
            name.find_first_attribute_string(Oid(OID_COUNTRY_NAME.as_ref().into()))
                .unwrap(),
            Some("BR".to_string())
        );
        assert_eq!(
            name.find_first_attribute_string(Oid(OID_COMMON_NAME.as_ref().into()))
                .unwrap(),
            Some("Unit Tester".to_string())
        );
        assert_eq!(
            name.find_first_attribute_string(Oid(OID_LOCALITY_NAME.as_ref().into()))
                .unwrap(),
            None
        );
    }

    #[test]
    fn name_encode_roundtrip() {
        let mut name = Name::default();
        name.append_printable_string(Oid(OID_COUNTRY_NAME.as_ref().into()), "US")
            .unwrap();
        name.append_utf8_string(Oid(OID_ORGANIZATION_NAME.as_ref().into()), "testing")
            .unwrap();

        let mut der = Vec::new();
        name.encode_ref()
            .write_encoded(Mode::Der, &mut der)
            .unwrap();

        let decoded = bcder::decode::Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            Name::take_from(cons)
        })
        .unwrap();

        assert_eq!(name, decoded);
        assert_eq!(
            decoded.user_friendly_str().unwrap(),
            "O=testing, C=US".to_string()
        );
    }
}
