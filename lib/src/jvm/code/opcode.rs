use crate::jvm::Error;

/// Category of an opcode, which determines the shape of the [`super::Instruction`] that carries it
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpcodeKind {
    Load,
    Store,
    Increment,
    Branch,
    LookupSwitch,
    TableSwitch,
    Return,
    ThrowException,
    FieldAccess,
    Invoke,
    InvokeDynamic,
    NewObject,
    NewPrimitiveArray,
    NewReferenceArray,
    NewMultiArray,
    TypeCheck,
    ArrayLoad,
    ArrayStore,
    Stack,
    Convert,
    Operator,
    Constant,
    Monitor,
    Nop,
    DiscontinuedJsr,
    DiscontinuedRet,
}

/// Kinds of values the JVM manipulates (plus `Void`, for "no value")
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Reference,
    Boolean,
    Void,
}

impl TypeKind {
    /// Number of local variable slots (or operand stack entries) the value takes up
    pub fn slot_size(self) -> u16 {
        match self {
            TypeKind::Void => 0,
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }

    /// Kind of the value as it lives on the operand stack (sub-`int` types are widened)
    pub fn as_computational(self) -> TypeKind {
        match self {
            TypeKind::Byte | TypeKind::Short | TypeKind::Char | TypeKind::Boolean => TypeKind::Int,
            other => other,
        }
    }

    /// Kind of the value described by a field descriptor (or return type)
    pub fn from_descriptor(descriptor: &str) -> Result<TypeKind, Error> {
        Ok(match descriptor.as_bytes().first() {
            Some(b'B') => TypeKind::Byte,
            Some(b'S') => TypeKind::Short,
            Some(b'C') => TypeKind::Char,
            Some(b'I') => TypeKind::Int,
            Some(b'J') => TypeKind::Long,
            Some(b'F') => TypeKind::Float,
            Some(b'D') => TypeKind::Double,
            Some(b'Z') => TypeKind::Boolean,
            Some(b'V') => TypeKind::Void,
            Some(b'L') | Some(b'[') => TypeKind::Reference,
            _ => return Err(Error::BadDescriptor(descriptor.to_owned())),
        })
    }

    /// Array type code used by `newarray`
    pub fn newarray_code(self) -> Option<u8> {
        match self {
            TypeKind::Boolean => Some(4),
            TypeKind::Char => Some(5),
            TypeKind::Float => Some(6),
            TypeKind::Double => Some(7),
            TypeKind::Byte => Some(8),
            TypeKind::Short => Some(9),
            TypeKind::Int => Some(10),
            TypeKind::Long => Some(11),
            TypeKind::Reference | TypeKind::Void => None,
        }
    }

    pub fn from_newarray_code(code: u8) -> Option<TypeKind> {
        match code {
            4 => Some(TypeKind::Boolean),
            5 => Some(TypeKind::Char),
            6 => Some(TypeKind::Float),
            7 => Some(TypeKind::Double),
            8 => Some(TypeKind::Byte),
            9 => Some(TypeKind::Short),
            10 => Some(TypeKind::Int),
            11 => Some(TypeKind::Long),
            _ => None,
        }
    }
}

/// Declares the opcode enum along with its lookup tables
///
/// Each row is `Variant = byte, size, kind, primary type`. A size of `0` means the instruction is
/// variable-width (the switches). Wide forms are the opcode that follows a `wide` prefix.
macro_rules! opcodes {
    (
        regular { $($r:ident = $rc:literal, $rs:literal, $rk:ident, $rt:ident;)* }
        wide { $($w:ident = $wc:literal, $ws:literal, $wk:ident, $wt:ident;)* }
    ) => {
        /// JVM opcode, including the `wide`-prefixed forms as separate opcodes
        ///
        /// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-6.html#jvms-6.5
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($r,)*
            $($w,)*
        }

        impl Opcode {
            /// Every opcode, in bytecode order (wide forms last)
            pub const ALL: &'static [Opcode] = &[$(Opcode::$r,)* $(Opcode::$w,)*];

            /// Byte encoding of the opcode (for wide forms, the byte after the `wide` prefix)
            pub fn bytecode(self) -> u8 {
                match self {
                    $(Opcode::$r => $rc,)*
                    $(Opcode::$w => $wc,)*
                }
            }

            /// Is this the `wide`-prefixed form of an opcode?
            pub fn is_wide(self) -> bool {
                matches!(self, $(Opcode::$w)|*)
            }

            pub fn from_bytecode(byte: u8) -> Option<Opcode> {
                match byte {
                    $($rc => Some(Opcode::$r),)*
                    _ => None,
                }
            }

            /// Opcode for the byte following a `wide` prefix
            pub fn wide_from_bytecode(byte: u8) -> Option<Opcode> {
                match byte {
                    $($wc => Some(Opcode::$w),)*
                    _ => None,
                }
            }

            /// Size in bytes of the encoded instruction, if it doesn't depend on its position
            pub fn size(self) -> Option<usize> {
                let size: usize = match self {
                    $(Opcode::$r => $rs,)*
                    $(Opcode::$w => $ws,)*
                };
                if size == 0 { None } else { Some(size) }
            }

            pub fn kind(self) -> OpcodeKind {
                match self {
                    $(Opcode::$r => OpcodeKind::$rk,)*
                    $(Opcode::$w => OpcodeKind::$wk,)*
                }
            }

            /// Type of the main value the opcode operates on (`Void` if there is none)
            pub fn primary_type_kind(self) -> TypeKind {
                match self {
                    $(Opcode::$r => TypeKind::$rt,)*
                    $(Opcode::$w => TypeKind::$wt,)*
                }
            }
        }
    };
}

opcodes! {
    regular {
        Nop = 0x00, 1, Nop, Void;
        AconstNull = 0x01, 1, Constant, Reference;
        IconstM1 = 0x02, 1, Constant, Int;
        Iconst0 = 0x03, 1, Constant, Int;
        Iconst1 = 0x04, 1, Constant, Int;
        Iconst2 = 0x05, 1, Constant, Int;
        Iconst3 = 0x06, 1, Constant, Int;
        Iconst4 = 0x07, 1, Constant, Int;
        Iconst5 = 0x08, 1, Constant, Int;
        Lconst0 = 0x09, 1, Constant, Long;
        Lconst1 = 0x0a, 1, Constant, Long;
        Fconst0 = 0x0b, 1, Constant, Float;
        Fconst1 = 0x0c, 1, Constant, Float;
        Fconst2 = 0x0d, 1, Constant, Float;
        Dconst0 = 0x0e, 1, Constant, Double;
        Dconst1 = 0x0f, 1, Constant, Double;
        Bipush = 0x10, 2, Constant, Byte;
        Sipush = 0x11, 3, Constant, Short;
        Ldc = 0x12, 2, Constant, Void;
        LdcW = 0x13, 3, Constant, Void;
        Ldc2W = 0x14, 3, Constant, Void;
        Iload = 0x15, 2, Load, Int;
        Lload = 0x16, 2, Load, Long;
        Fload = 0x17, 2, Load, Float;
        Dload = 0x18, 2, Load, Double;
        Aload = 0x19, 2, Load, Reference;
        Iload0 = 0x1a, 1, Load, Int;
        Iload1 = 0x1b, 1, Load, Int;
        Iload2 = 0x1c, 1, Load, Int;
        Iload3 = 0x1d, 1, Load, Int;
        Lload0 = 0x1e, 1, Load, Long;
        Lload1 = 0x1f, 1, Load, Long;
        Lload2 = 0x20, 1, Load, Long;
        Lload3 = 0x21, 1, Load, Long;
        Fload0 = 0x22, 1, Load, Float;
        Fload1 = 0x23, 1, Load, Float;
        Fload2 = 0x24, 1, Load, Float;
        Fload3 = 0x25, 1, Load, Float;
        Dload0 = 0x26, 1, Load, Double;
        Dload1 = 0x27, 1, Load, Double;
        Dload2 = 0x28, 1, Load, Double;
        Dload3 = 0x29, 1, Load, Double;
        Aload0 = 0x2a, 1, Load, Reference;
        Aload1 = 0x2b, 1, Load, Reference;
        Aload2 = 0x2c, 1, Load, Reference;
        Aload3 = 0x2d, 1, Load, Reference;
        Iaload = 0x2e, 1, ArrayLoad, Int;
        Laload = 0x2f, 1, ArrayLoad, Long;
        Faload = 0x30, 1, ArrayLoad, Float;
        Daload = 0x31, 1, ArrayLoad, Double;
        Aaload = 0x32, 1, ArrayLoad, Reference;
        Baload = 0x33, 1, ArrayLoad, Byte;
        Caload = 0x34, 1, ArrayLoad, Char;
        Saload = 0x35, 1, ArrayLoad, Short;
        Istore = 0x36, 2, Store, Int;
        Lstore = 0x37, 2, Store, Long;
        Fstore = 0x38, 2, Store, Float;
        Dstore = 0x39, 2, Store, Double;
        Astore = 0x3a, 2, Store, Reference;
        Istore0 = 0x3b, 1, Store, Int;
        Istore1 = 0x3c, 1, Store, Int;
        Istore2 = 0x3d, 1, Store, Int;
        Istore3 = 0x3e, 1, Store, Int;
        Lstore0 = 0x3f, 1, Store, Long;
        Lstore1 = 0x40, 1, Store, Long;
        Lstore2 = 0x41, 1, Store, Long;
        Lstore3 = 0x42, 1, Store, Long;
        Fstore0 = 0x43, 1, Store, Float;
        Fstore1 = 0x44, 1, Store, Float;
        Fstore2 = 0x45, 1, Store, Float;
        Fstore3 = 0x46, 1, Store, Float;
        Dstore0 = 0x47, 1, Store, Double;
        Dstore1 = 0x48, 1, Store, Double;
        Dstore2 = 0x49, 1, Store, Double;
        Dstore3 = 0x4a, 1, Store, Double;
        Astore0 = 0x4b, 1, Store, Reference;
        Astore1 = 0x4c, 1, Store, Reference;
        Astore2 = 0x4d, 1, Store, Reference;
        Astore3 = 0x4e, 1, Store, Reference;
        Iastore = 0x4f, 1, ArrayStore, Int;
        Lastore = 0x50, 1, ArrayStore, Long;
        Fastore = 0x51, 1, ArrayStore, Float;
        Dastore = 0x52, 1, ArrayStore, Double;
        Aastore = 0x53, 1, ArrayStore, Reference;
        Bastore = 0x54, 1, ArrayStore, Byte;
        Castore = 0x55, 1, ArrayStore, Char;
        Sastore = 0x56, 1, ArrayStore, Short;
        Pop = 0x57, 1, Stack, Void;
        Pop2 = 0x58, 1, Stack, Void;
        Dup = 0x59, 1, Stack, Void;
        DupX1 = 0x5a, 1, Stack, Void;
        DupX2 = 0x5b, 1, Stack, Void;
        Dup2 = 0x5c, 1, Stack, Void;
        Dup2X1 = 0x5d, 1, Stack, Void;
        Dup2X2 = 0x5e, 1, Stack, Void;
        Swap = 0x5f, 1, Stack, Void;
        Iadd = 0x60, 1, Operator, Int;
        Ladd = 0x61, 1, Operator, Long;
        Fadd = 0x62, 1, Operator, Float;
        Dadd = 0x63, 1, Operator, Double;
        Isub = 0x64, 1, Operator, Int;
        Lsub = 0x65, 1, Operator, Long;
        Fsub = 0x66, 1, Operator, Float;
        Dsub = 0x67, 1, Operator, Double;
        Imul = 0x68, 1, Operator, Int;
        Lmul = 0x69, 1, Operator, Long;
        Fmul = 0x6a, 1, Operator, Float;
        Dmul = 0x6b, 1, Operator, Double;
        Idiv = 0x6c, 1, Operator, Int;
        Ldiv = 0x6d, 1, Operator, Long;
        Fdiv = 0x6e, 1, Operator, Float;
        Ddiv = 0x6f, 1, Operator, Double;
        Irem = 0x70, 1, Operator, Int;
        Lrem = 0x71, 1, Operator, Long;
        Frem = 0x72, 1, Operator, Float;
        Drem = 0x73, 1, Operator, Double;
        Ineg = 0x74, 1, Operator, Int;
        Lneg = 0x75, 1, Operator, Long;
        Fneg = 0x76, 1, Operator, Float;
        Dneg = 0x77, 1, Operator, Double;
        Ishl = 0x78, 1, Operator, Int;
        Lshl = 0x79, 1, Operator, Long;
        Ishr = 0x7a, 1, Operator, Int;
        Lshr = 0x7b, 1, Operator, Long;
        Iushr = 0x7c, 1, Operator, Int;
        Lushr = 0x7d, 1, Operator, Long;
        Iand = 0x7e, 1, Operator, Int;
        Land = 0x7f, 1, Operator, Long;
        Ior = 0x80, 1, Operator, Int;
        Lor = 0x81, 1, Operator, Long;
        Ixor = 0x82, 1, Operator, Int;
        Lxor = 0x83, 1, Operator, Long;
        Iinc = 0x84, 3, Increment, Int;
        I2l = 0x85, 1, Convert, Int;
        I2f = 0x86, 1, Convert, Int;
        I2d = 0x87, 1, Convert, Int;
        L2i = 0x88, 1, Convert, Long;
        L2f = 0x89, 1, Convert, Long;
        L2d = 0x8a, 1, Convert, Long;
        F2i = 0x8b, 1, Convert, Float;
        F2l = 0x8c, 1, Convert, Float;
        F2d = 0x8d, 1, Convert, Float;
        D2i = 0x8e, 1, Convert, Double;
        D2l = 0x8f, 1, Convert, Double;
        D2f = 0x90, 1, Convert, Double;
        I2b = 0x91, 1, Convert, Int;
        I2c = 0x92, 1, Convert, Int;
        I2s = 0x93, 1, Convert, Int;
        Lcmp = 0x94, 1, Operator, Long;
        Fcmpl = 0x95, 1, Operator, Float;
        Fcmpg = 0x96, 1, Operator, Float;
        Dcmpl = 0x97, 1, Operator, Double;
        Dcmpg = 0x98, 1, Operator, Double;
        Ifeq = 0x99, 3, Branch, Int;
        Ifne = 0x9a, 3, Branch, Int;
        Iflt = 0x9b, 3, Branch, Int;
        Ifge = 0x9c, 3, Branch, Int;
        Ifgt = 0x9d, 3, Branch, Int;
        Ifle = 0x9e, 3, Branch, Int;
        IfIcmpeq = 0x9f, 3, Branch, Int;
        IfIcmpne = 0xa0, 3, Branch, Int;
        IfIcmplt = 0xa1, 3, Branch, Int;
        IfIcmpge = 0xa2, 3, Branch, Int;
        IfIcmpgt = 0xa3, 3, Branch, Int;
        IfIcmple = 0xa4, 3, Branch, Int;
        IfAcmpeq = 0xa5, 3, Branch, Reference;
        IfAcmpne = 0xa6, 3, Branch, Reference;
        Goto = 0xa7, 3, Branch, Void;
        Jsr = 0xa8, 3, DiscontinuedJsr, Void;
        Ret = 0xa9, 2, DiscontinuedRet, Void;
        Tableswitch = 0xaa, 0, TableSwitch, Int;
        Lookupswitch = 0xab, 0, LookupSwitch, Int;
        Ireturn = 0xac, 1, Return, Int;
        Lreturn = 0xad, 1, Return, Long;
        Freturn = 0xae, 1, Return, Float;
        Dreturn = 0xaf, 1, Return, Double;
        Areturn = 0xb0, 1, Return, Reference;
        Return = 0xb1, 1, Return, Void;
        Getstatic = 0xb2, 3, FieldAccess, Void;
        Putstatic = 0xb3, 3, FieldAccess, Void;
        Getfield = 0xb4, 3, FieldAccess, Void;
        Putfield = 0xb5, 3, FieldAccess, Void;
        Invokevirtual = 0xb6, 3, Invoke, Void;
        Invokespecial = 0xb7, 3, Invoke, Void;
        Invokestatic = 0xb8, 3, Invoke, Void;
        Invokeinterface = 0xb9, 5, Invoke, Void;
        Invokedynamic = 0xba, 5, InvokeDynamic, Void;
        New = 0xbb, 3, NewObject, Reference;
        Newarray = 0xbc, 2, NewPrimitiveArray, Void;
        Anewarray = 0xbd, 3, NewReferenceArray, Reference;
        Arraylength = 0xbe, 1, Operator, Int;
        Athrow = 0xbf, 1, ThrowException, Reference;
        Checkcast = 0xc0, 3, TypeCheck, Reference;
        Instanceof = 0xc1, 3, TypeCheck, Reference;
        Monitorenter = 0xc2, 1, Monitor, Reference;
        Monitorexit = 0xc3, 1, Monitor, Reference;
        Multianewarray = 0xc5, 4, NewMultiArray, Reference;
        Ifnull = 0xc6, 3, Branch, Reference;
        Ifnonnull = 0xc7, 3, Branch, Reference;
        GotoW = 0xc8, 5, Branch, Void;
        JsrW = 0xc9, 5, DiscontinuedJsr, Void;
    }
    wide {
        IloadW = 0x15, 4, Load, Int;
        LloadW = 0x16, 4, Load, Long;
        FloadW = 0x17, 4, Load, Float;
        DloadW = 0x18, 4, Load, Double;
        AloadW = 0x19, 4, Load, Reference;
        IstoreW = 0x36, 4, Store, Int;
        LstoreW = 0x37, 4, Store, Long;
        FstoreW = 0x38, 4, Store, Float;
        DstoreW = 0x39, 4, Store, Double;
        AstoreW = 0x3a, 4, Store, Reference;
        IincW = 0x84, 6, Increment, Int;
        RetW = 0xa9, 4, DiscontinuedRet, Void;
    }
}

/// Prefix byte for the wide forms
pub const WIDE_PREFIX: u8 = 0xc4;

impl Opcode {
    /// Conditional branch taking one or two operands off the stack
    pub fn is_conditional_branch(self) -> bool {
        self.kind() == OpcodeKind::Branch && self.primary_type_kind() != TypeKind::Void
    }

    /// Does control never continue on to the next instruction?
    pub fn is_unconditional_branch(self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::GotoW
                | Opcode::Athrow
                | Opcode::Tableswitch
                | Opcode::Lookupswitch
                | Opcode::Ret
                | Opcode::RetW
        ) || self.kind() == OpcodeKind::Return
    }

    /// Opcode whose condition is the logical negation of this one
    ///
    /// Only conditional branches can be reversed.
    pub fn reverse_branch(self) -> Result<Opcode, Error> {
        Ok(match self {
            Opcode::Ifeq => Opcode::Ifne,
            Opcode::Ifne => Opcode::Ifeq,
            Opcode::Iflt => Opcode::Ifge,
            Opcode::Ifge => Opcode::Iflt,
            Opcode::Ifgt => Opcode::Ifle,
            Opcode::Ifle => Opcode::Ifgt,
            Opcode::IfIcmpeq => Opcode::IfIcmpne,
            Opcode::IfIcmpne => Opcode::IfIcmpeq,
            Opcode::IfIcmplt => Opcode::IfIcmpge,
            Opcode::IfIcmpge => Opcode::IfIcmplt,
            Opcode::IfIcmpgt => Opcode::IfIcmple,
            Opcode::IfIcmple => Opcode::IfIcmpgt,
            Opcode::IfAcmpeq => Opcode::IfAcmpne,
            Opcode::IfAcmpne => Opcode::IfAcmpeq,
            Opcode::Ifnull => Opcode::Ifnonnull,
            Opcode::Ifnonnull => Opcode::Ifnull,
            other => return Err(Error::NotConditionalBranch(other)),
        })
    }

    /// Local variable slot baked into the opcode (eg. `iload_2`)
    pub fn intrinsic_slot(self) -> Option<u16> {
        use Opcode::*;
        match self {
            Iload0 | Lload0 | Fload0 | Dload0 | Aload0 | Istore0 | Lstore0 | Fstore0 | Dstore0
            | Astore0 => Some(0),
            Iload1 | Lload1 | Fload1 | Dload1 | Aload1 | Istore1 | Lstore1 | Fstore1 | Dstore1
            | Astore1 => Some(1),
            Iload2 | Lload2 | Fload2 | Dload2 | Aload2 | Istore2 | Lstore2 | Fstore2 | Dstore2
            | Astore2 => Some(2),
            Iload3 | Lload3 | Fload3 | Dload3 | Aload3 | Istore3 | Lstore3 | Fstore3 | Dstore3
            | Astore3 => Some(3),
            _ => None,
        }
    }

    /// Wide form of a `u1`-indexed opcode (eg. `iload` to `wide iload`)
    pub fn widened(self) -> Option<Opcode> {
        if self.is_wide() {
            return Some(self);
        }
        match self.size() {
            Some(2) | Some(3) => Opcode::wide_from_bytecode(self.bytecode()),
            _ => None,
        }
    }

    /// Most compact load opcode for a slot
    pub fn load(kind: TypeKind, slot: u16) -> Result<Opcode, Error> {
        use Opcode::*;
        let forms = match kind.as_computational() {
            TypeKind::Int => [Iload0, Iload1, Iload2, Iload3, Iload, IloadW],
            TypeKind::Long => [Lload0, Lload1, Lload2, Lload3, Lload, LloadW],
            TypeKind::Float => [Fload0, Fload1, Fload2, Fload3, Fload, FloadW],
            TypeKind::Double => [Dload0, Dload1, Dload2, Dload3, Dload, DloadW],
            TypeKind::Reference => [Aload0, Aload1, Aload2, Aload3, Aload, AloadW],
            _ => return Err(Error::WrongOpcode { opcode: Nop, shape: "a load of void" }),
        };
        Ok(Opcode::pick_local_form(forms, slot))
    }

    /// Most compact store opcode for a slot
    pub fn store(kind: TypeKind, slot: u16) -> Result<Opcode, Error> {
        use Opcode::*;
        let forms = match kind.as_computational() {
            TypeKind::Int => [Istore0, Istore1, Istore2, Istore3, Istore, IstoreW],
            TypeKind::Long => [Lstore0, Lstore1, Lstore2, Lstore3, Lstore, LstoreW],
            TypeKind::Float => [Fstore0, Fstore1, Fstore2, Fstore3, Fstore, FstoreW],
            TypeKind::Double => [Dstore0, Dstore1, Dstore2, Dstore3, Dstore, DstoreW],
            TypeKind::Reference => [Astore0, Astore1, Astore2, Astore3, Astore, AstoreW],
            _ => return Err(Error::WrongOpcode { opcode: Nop, shape: "a store of void" }),
        };
        Ok(Opcode::pick_local_form(forms, slot))
    }

    fn pick_local_form(forms: [Opcode; 6], slot: u16) -> Opcode {
        match slot {
            0..=3 => forms[slot as usize],
            4..=255 => forms[4],
            _ => forms[5],
        }
    }

    /// Return opcode for a method returning this kind
    pub fn return_of(kind: TypeKind) -> Opcode {
        match kind.as_computational() {
            TypeKind::Int => Opcode::Ireturn,
            TypeKind::Long => Opcode::Lreturn,
            TypeKind::Float => Opcode::Freturn,
            TypeKind::Double => Opcode::Dreturn,
            TypeKind::Reference => Opcode::Areturn,
            _ => Opcode::Return,
        }
    }

    /// Array element load opcode
    pub fn array_load(kind: TypeKind) -> Result<Opcode, Error> {
        Ok(match kind {
            TypeKind::Int => Opcode::Iaload,
            TypeKind::Long => Opcode::Laload,
            TypeKind::Float => Opcode::Faload,
            TypeKind::Double => Opcode::Daload,
            TypeKind::Reference => Opcode::Aaload,
            TypeKind::Byte | TypeKind::Boolean => Opcode::Baload,
            TypeKind::Char => Opcode::Caload,
            TypeKind::Short => Opcode::Saload,
            TypeKind::Void => return Err(Error::WrongOpcode { opcode: Opcode::Nop, shape: "an array load of void" }),
        })
    }

    /// Array element store opcode
    pub fn array_store(kind: TypeKind) -> Result<Opcode, Error> {
        Ok(match kind {
            TypeKind::Int => Opcode::Iastore,
            TypeKind::Long => Opcode::Lastore,
            TypeKind::Float => Opcode::Fastore,
            TypeKind::Double => Opcode::Dastore,
            TypeKind::Reference => Opcode::Aastore,
            TypeKind::Byte | TypeKind::Boolean => Opcode::Bastore,
            TypeKind::Char => Opcode::Castore,
            TypeKind::Short => Opcode::Sastore,
            TypeKind::Void => return Err(Error::WrongOpcode { opcode: Opcode::Nop, shape: "an array store of void" }),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytecode_tables_agree() {
        for &opcode in Opcode::ALL {
            let decoded = if opcode.is_wide() {
                Opcode::wide_from_bytecode(opcode.bytecode())
            } else {
                Opcode::from_bytecode(opcode.bytecode())
            };
            assert_eq!(decoded, Some(opcode), "round trip of {:?}", opcode);
        }
        assert_eq!(Opcode::from_bytecode(WIDE_PREFIX), None);
        assert_eq!(Opcode::from_bytecode(0xca), None);
    }

    #[test]
    fn reversal_negates_the_condition() {
        use Opcode::*;
        let negations = [
            (Ifeq, Ifne),
            (Ifne, Ifeq),
            (Iflt, Ifge),
            (Ifge, Iflt),
            (Ifgt, Ifle),
            (Ifle, Ifgt),
            (IfIcmpeq, IfIcmpne),
            (IfIcmpne, IfIcmpeq),
            (IfIcmplt, IfIcmpge),
            (IfIcmpge, IfIcmplt),
            (IfIcmpgt, IfIcmple),
            (IfIcmple, IfIcmpgt),
            (IfAcmpeq, IfAcmpne),
            (IfAcmpne, IfAcmpeq),
            (Ifnull, Ifnonnull),
            (Ifnonnull, Ifnull),
        ];
        let conditionals = Opcode::ALL
            .iter()
            .filter(|op| op.is_conditional_branch())
            .count();
        assert_eq!(conditionals, negations.len());
        for (opcode, negated) in negations {
            assert_eq!(opcode.reverse_branch().unwrap(), negated, "{:?}", opcode);
        }
    }

    #[test]
    fn only_conditional_branches_reverse() {
        for &opcode in Opcode::ALL {
            assert_eq!(
                opcode.reverse_branch().is_ok(),
                opcode.is_conditional_branch(),
                "{:?}",
                opcode
            );
        }
        assert!(Opcode::Goto.reverse_branch().is_err());
        assert!(Opcode::Jsr.reverse_branch().is_err());
    }

    #[test]
    fn local_forms() {
        assert_eq!(Opcode::load(TypeKind::Int, 2).unwrap(), Opcode::Iload2);
        assert_eq!(Opcode::load(TypeKind::Boolean, 7).unwrap(), Opcode::Iload);
        assert_eq!(Opcode::store(TypeKind::Reference, 300).unwrap(), Opcode::AstoreW);
        assert_eq!(Opcode::Lload.widened(), Some(Opcode::LloadW));
        assert_eq!(Opcode::Iinc.widened(), Some(Opcode::IincW));
        assert_eq!(Opcode::Lload1.widened(), None);
        assert_eq!(Opcode::Iload3.intrinsic_slot(), Some(3));
    }
}
